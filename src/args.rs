// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;

use secrecy::SecretString;
use thiserror::Error;

/// Six flags, each followed by its value.
pub const MIN_ARGS: usize = 12;

static USAGE: &str = "usage:  -client_id <oauth client> -client_secret <client secret> -username <username> -password <password> -broker <broker uri> -oauthURI <oauth uri>

 -client_id The OAuth clientId to use when requesting an access token.
 -client_secret The OAuth client secret to use when requesting an access token.
 -username The username to use when requesting an access token.
 -password The password to use when requesting an access token.
 -broker The URI of the MQTT broker endpoint to connect to.
 -oauthURI The URI for the OAuth provider access token request.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Expected at least 12 arguments, received {0}")]
    TooFewArguments(usize),
    #[error("Unrecognized flag {0}")]
    UnrecognizedFlag(String),
    #[error("Flag {0} is missing its value")]
    MissingValue(String),
    #[error("Required flag {0} was not supplied")]
    MissingFlag(&'static str),
}

#[derive(Debug)]
pub struct SampleArgs {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
    pub broker: String,
    pub oauth_uri: String,
}

impl SampleArgs {
    /// Parses flag/value pairs, excluding the program name. A repeated flag keeps its last value.
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let args = args.into_iter().collect::<Vec<_>>();
        if args.len() < MIN_ARGS {
            return Err(UsageError::TooFewArguments(args.len()));
        }

        let mut client_id = None;
        let mut client_secret = None;
        let mut username = None;
        let mut password = None;
        let mut broker = None;
        let mut oauth_uri = None;

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let slot = match flag.as_str() {
                "-client_id" => &mut client_id,
                "-client_secret" => &mut client_secret,
                "-username" => &mut username,
                "-password" => &mut password,
                "-broker" => &mut broker,
                "-oauthURI" => &mut oauth_uri,
                _ => return Err(UsageError::UnrecognizedFlag(flag)),
            };
            match args.next() {
                Some(value) => *slot = Some(value),
                None => return Err(UsageError::MissingValue(flag)),
            }
        }

        Ok(Self {
            client_id: client_id.ok_or(UsageError::MissingFlag("-client_id"))?,
            client_secret: client_secret
                .map(SecretString::from)
                .ok_or(UsageError::MissingFlag("-client_secret"))?,
            username: username.ok_or(UsageError::MissingFlag("-username"))?,
            password: password
                .map(SecretString::from)
                .ok_or(UsageError::MissingFlag("-password"))?,
            broker: broker.ok_or(UsageError::MissingFlag("-broker"))?,
            oauth_uri: oauth_uri.ok_or(UsageError::MissingFlag("-oauthURI"))?,
        })
    }
}

pub fn print_usage(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{USAGE}")
}
