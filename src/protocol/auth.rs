// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker credential derivation.
//!
//! The LetPot broker authenticates with credentials derived from the
//! cloud account rather than issued tokens: the username is the account
//! email with a fixed protocol suffix, the password a salted hash over
//! the user id and the hashed username.

use md5::Md5;
use sha2::{Digest, Sha256};

/// Suffix appended to the account email to form the broker username.
const USERNAME_SUFFIX: &str = "__letpot_v3";

/// Authentication info for a LetPot cloud account.
///
/// Produced by the cloud login flow (not part of this crate); this
/// library only consumes the user id and email to derive broker
/// credentials.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuthInfo {
    /// The cloud account user id.
    pub user_id: String,
    /// The cloud account email address.
    pub email: String,
}

/// Derives the broker username and password for an account.
pub(crate) fn broker_credentials(info: &AuthInfo) -> (String, String) {
    let username = format!("{}{USERNAME_SUFFIX}", info.email);
    let username_digest = hex::encode(Md5::digest(username.as_bytes()));
    let password = hex::encode(Sha256::digest(
        format!("{}|{username_digest}", info.user_id).as_bytes(),
    ));
    (username, password)
}

/// Generates a fresh client identifier for one broker connection.
pub(crate) fn generate_client_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("LetPot_{millis}_{}", &nonce[..8])
}
