// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use secrecy::{ExposeSecret, SecretString};
use url::form_urlencoded;

static GRANT_TYPE: &str = "password";

/// Resource owner credentials exchanged for an access token with the OAuth 2 password grant.
#[derive(Debug)]
pub struct PasswordGrant {
    pub client_id: String,
    pub client_secret: SecretString,
    pub username: String,
    pub password: SecretString,
}

impl PasswordGrant {
    /// Encodes the grant as an `application/x-www-form-urlencoded` body. Field order is fixed.
    pub fn form_body(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", GRANT_TYPE)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", self.client_secret.expose_secret())
            .append_pair("username", &self.username)
            .append_pair("password", self.password.expose_secret())
            .finish()
    }
}
