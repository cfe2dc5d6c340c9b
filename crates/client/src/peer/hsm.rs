//! Remote HSM authentication peer
//!
//! Proxies each handshake step through an HTTP + protobuf "scripted query"
//! exchange with an HSM service. The HSM owns the signing keys and the
//! secure channel; the client only forwards device-bound APDU bytes when a
//! script demands it, so [`AuthPeer::shared_secret`] stays `None`.

use prost::Message;
use tracing::debug;
use zeroize::Zeroizing;

use super::{AuthPeer, CertificateEntry, NONCE_LENGTH};
use crate::codec::serialize;
use crate::error::{Error, Result};

/// Production HSM endpoint
pub const DEFAULT_HSM_URL: &str = "https://hsmprod.hardwarewallet.com/hsm/process";

/// Default personalization key identifier
pub const DEFAULT_HSM_KEY: &str = "perso_11";

mod proto {
    //! Wire messages of the HSM scripted-query protocol

    /// A named parameter resolved on the HSM side
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RemoteParameter {
        /// Alias the script refers to the parameter by
        #[prost(string, tag = "1")]
        pub alias: ::prost::alloc::string::String,
        /// Resolved name on the server
        #[prost(string, tag = "2")]
        pub name: ::prost::alloc::string::String,
        /// Whether the parameter is local to the session
        #[prost(bool, tag = "3")]
        pub local: bool,
    }

    /// One scripted query
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {
        /// Script reference to execute
        #[prost(string, tag = "1")]
        pub reference: ::prost::alloc::string::String,
        /// Opaque request payload
        #[prost(bytes = "vec", tag = "2")]
        pub parameters: ::prost::alloc::vec::Vec<u8>,
        /// Session id, echoed from the previous response
        #[prost(string, tag = "3")]
        pub id: ::prost::alloc::string::String,
        /// Request a large execution stack
        #[prost(bool, tag = "4")]
        pub large_stack: bool,
        /// Parameters resolved server-side
        #[prost(message, repeated, tag = "5")]
        pub remote_parameters: ::prost::alloc::vec::Vec<RemoteParameter>,
    }

    /// Scripted query result
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Response {
        /// Opaque response payload
        #[prost(bytes = "vec", tag = "1")]
        pub response: ::prost::alloc::vec::Vec<u8>,
        /// Error message, empty on success
        #[prost(string, tag = "2")]
        pub exception: ::prost::alloc::string::String,
        /// Session id to echo on the next request
        #[prost(string, tag = "3")]
        pub id: ::prost::alloc::string::String,
    }
}

/// A script hosted on the HSM, with its default parameter bindings
#[derive(Debug, Clone)]
pub struct HsmScript {
    /// Script reference
    pub name: String,
    /// Default (alias, name) parameter bindings
    pub default_params: Vec<(String, String)>,
    /// Whether the script needs a large execution stack
    pub large_stack: bool,
}

impl HsmScript {
    /// Create a script reference with default parameters
    pub fn new(name: &str, default_params: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            default_params: default_params
                .iter()
                .map(|(alias, name)| (alias.to_string(), name.to_string()))
                .collect(),
            large_stack: true,
        }
    }
}

/// Authentication peer backed by a remote HSM
#[derive(Debug)]
pub struct HsmAuthPeer {
    script: HsmScript,
    url: String,
    http: reqwest::blocking::Client,
    device_nonce: Option<[u8; NONCE_LENGTH]>,
    public_key: Option<Vec<u8>>,
    last_request_id: Option<String>,
}

impl HsmAuthPeer {
    /// Create a peer that runs `script` on the HSM at `url`
    pub fn new(script: HsmScript, url: &str) -> Self {
        Self {
            script,
            url: url.to_string(),
            http: reqwest::blocking::Client::new(),
            device_nonce: None,
            public_key: None,
            last_request_id: None,
        }
    }

    /// Run one scripted query round trip
    ///
    /// `params` overrides the script's default parameter bindings when given.
    pub fn query(&mut self, data: Option<&[u8]>, params: Option<&[(&str, &str)]>) -> Result<Vec<u8>> {
        let mut request = proto::Request {
            reference: self.script.name.clone(),
            large_stack: self.script.large_stack,
            ..Default::default()
        };
        if let Some(id) = &self.last_request_id {
            request.id.clone_from(id);
        }

        match params {
            Some(params) => {
                for &(alias, name) in params {
                    request.remote_parameters.push(proto::RemoteParameter {
                        alias: alias.to_string(),
                        name: name.to_string(),
                        local: false,
                    });
                }
            }
            None => {
                for (alias, name) in &self.script.default_params {
                    request.remote_parameters.push(proto::RemoteParameter {
                        alias: alias.clone(),
                        name: name.clone(),
                        local: false,
                    });
                }
            }
        }

        if let Some(data) = data {
            request.parameters = data.to_vec();
        }

        debug!(script = %self.script.name, "querying HSM");
        let body = self
            .http
            .post(&self.url)
            .body(request.encode_to_vec())
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(|e| Error::Remote(e.to_string()))?;

        let response =
            proto::Response::decode(body.as_ref()).map_err(|e| Error::Remote(e.to_string()))?;

        self.last_request_id = Some(response.id);
        if !response.exception.is_empty() {
            return Err(Error::Remote(response.exception));
        }
        Ok(response.response)
    }
}

impl AuthPeer for HsmAuthPeer {
    fn get_nonce(&mut self) -> Result<[u8; NONCE_LENGTH]> {
        // The opening query returns the HSM public key followed by its nonce
        let response = self.query(None, None)?;
        if response.len() < 65 + NONCE_LENGTH {
            return Err(Error::Remote("short HSM nonce response".to_string()));
        }

        self.public_key = Some(response[..65].to_vec());
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&response[65..65 + NONCE_LENGTH]);
        Ok(nonce)
    }

    fn send_nonce(&mut self, nonce: &[u8]) -> Result<()> {
        let nonce: [u8; NONCE_LENGTH] = nonce
            .try_into()
            .map_err(|_| Error::InvalidArgument("device nonce must be 8 bytes"))?;
        self.device_nonce = Some(nonce);
        Ok(())
    }

    fn receive_certificate_chain(&mut self) -> Result<Vec<CertificateEntry>> {
        let device_nonce = self
            .device_nonce
            .ok_or_else(|| Error::Remote("device nonce not sent".to_string()))?;
        let public_key = self
            .public_key
            .clone()
            .ok_or_else(|| Error::Remote("HSM public key not received".to_string()))?;

        // The HSM signs its public key over the device nonce
        let signature = self.query(Some(&device_nonce), None)?;

        let mut entry = serialize(&public_key)?;
        entry.extend_from_slice(&serialize(&signature)?);
        Ok(vec![entry])
    }

    fn send_certificate_chain(&mut self, chain: Vec<CertificateEntry>) -> Result<()> {
        for certificate in chain {
            self.query(Some(&certificate), None)?;
        }
        Ok(())
    }

    fn shared_secret(&self) -> Option<Zeroizing<[u8; 32]>> {
        // The HSM never reveals the channel keys
        None
    }
}
