//! DTOs for interacting with an OAuth2 token endpoint

use serde::{Deserialize, Serialize, Serializer};
use smctl_clock::DurationSecs;

use crate::{
    AccessToken, ClientIdRef, ClientSecretRef, PasswordRef, RefreshToken, RefreshTokenRef,
    UsernameRef,
};

fn serialize_client<S: serde::ser::SerializeStruct>(
    ser: &mut S,
    client_id: &ClientIdRef,
    client_secret: Option<&ClientSecretRef>,
) -> Result<(), S::Error> {
    ser.serialize_field("client_id", client_id)?;
    if let Some(secret) = client_secret {
        ser.serialize_field("client_secret", secret)?;
    } else {
        ser.skip_field("client_secret")?;
    }
    Ok(())
}

/// Client credentials, used to authenticate the client itself
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    /// The client ID
    pub client_id: &'a ClientIdRef,

    /// The client secret
    pub client_secret: &'a ClientSecretRef,
}

impl Serialize for ClientCredentials<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentials", 3)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        serialize_client(&mut ser, self.client_id, Some(self.client_secret))?;
        ser.end()
    }
}

impl super::CredentialsSource for ClientCredentials<'_> {
    fn client_id(&self) -> &ClientIdRef {
        self.client_id
    }
    fn grant_type() -> &'static str {
        "client_credentials"
    }
}

/// Resource owner password credentials
#[derive(Debug, Clone, Copy)]
pub struct PasswordCredentials<'a> {
    /// The client ID
    pub client_id: &'a ClientIdRef,

    /// The client secret, if the client is confidential
    pub client_secret: Option<&'a ClientSecretRef>,

    /// The end user's name
    pub username: &'a UsernameRef,

    /// The end user's password
    pub password: &'a PasswordRef,
}

impl Serialize for PasswordCredentials<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("PasswordCredentials", 5)?;
        ser.serialize_field("grant_type", "password")?;
        serialize_client(&mut ser, self.client_id, self.client_secret)?;
        ser.serialize_field("username", self.username)?;
        ser.serialize_field("password", self.password)?;
        ser.end()
    }
}

impl super::CredentialsSource for PasswordCredentials<'_> {
    fn client_id(&self) -> &ClientIdRef {
        self.client_id
    }
    fn grant_type() -> &'static str {
        "password"
    }
}

/// Refresh token credentials
#[derive(Debug, Clone, Copy)]
pub struct RefreshTokenCredentials<'a> {
    /// The client ID
    pub client_id: &'a ClientIdRef,

    /// The client secret, if required
    pub client_secret: Option<&'a ClientSecretRef>,

    /// The refresh token
    pub refresh_token: &'a RefreshTokenRef,
}

impl Serialize for RefreshTokenCredentials<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshTokenCredentials", 4)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        serialize_client(&mut ser, self.client_id, self.client_secret)?;
        ser.serialize_field("refresh_token", self.refresh_token)?;
        ser.end()
    }
}

impl super::CredentialsSource for RefreshTokenCredentials<'_> {
    fn client_id(&self) -> &ClientIdRef {
        self.client_id
    }
    fn grant_type() -> &'static str {
        "refresh_token"
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: AccessToken,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default)]
    pub expires_in: Option<DurationSecs>,
    #[serde(default)]
    pub scope: Option<String>,
}
