// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::process::ExitCode;

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{
    args::{SampleArgs, print_usage},
    settings::Settings,
};

mod args;
mod mqtt;
mod sample;
mod settings;
#[cfg(test)]
mod test_support;
mod token;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode, anyhow::Error> {
    let settings = Settings::new()?;

    // stdout carries the connection status lines, so logs go to stderr unless redirected to a file
    let (writer, _guard) = if let Some(log_directory) = &settings.log_directory {
        let file_appender =
            tracing_appender::rolling::daily(log_directory, "mqtt-oauth-connect.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        NonBlocking::new(std::io::stderr())
    };

    let _subscriber = tracing_subscriber::fmt()
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(writer)
        .json()
        .init();

    let args = match SampleArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            tracing::debug!(?err, "Invalid arguments");
            print_usage(&mut std::io::stderr())?;
            return Ok(ExitCode::from(settings.exit_policy.usage()));
        }
    };

    match sample::run(args, &settings, &mut std::io::stdout()).await {
        Ok(()) => Ok(ExitCode::from(settings.exit_policy.success())),
        Err(err) => {
            tracing::error!(error = ?err, "Sample failed");
            Ok(ExitCode::from(settings.exit_policy.failure()))
        }
    }
}
