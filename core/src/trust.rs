//! Certificate trust policy and its rustls adapters.
//!
//! # Design
//! [`TrustPolicy`] decides whether a presented chain is acceptable; it knows
//! nothing about TLS. [`ServerVerifier`] and [`ClientVerifier`] plug the same
//! policy into a rustls handshake in either direction. Handshake signatures
//! are still checked with the provider's algorithms, so every mode proves
//! possession of the presented key; only chain building and hostname checks
//! are skipped. No issuer is ever advertised.
//!
//! [`TrustPolicy::Unverified`] accepts any chain. It exists for development
//! against self-signed servers and gives no protection against an active
//! attacker.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, OtherError, SignatureScheme};

use crate::error::{Error, Peer, TrustFailure, TrustFailureReason};

/// A certificate serial number, stored big-endian without leading zeros.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        SerialNumber(bytes[start..].to_vec())
    }

    /// Parse hex digits, optionally separated by `:` or whitespace.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits: Vec<u8> = hex
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<_>>()?;
        if digits.is_empty() {
            return None;
        }
        let mut bytes = Vec::with_capacity(digits.len() / 2 + 1);
        let mut iter = digits.iter();
        if digits.len() % 2 == 1 {
            bytes.push(*iter.next()?);
        }
        while let (Some(hi), Some(lo)) = (iter.next(), iter.next()) {
            bytes.push(hi << 4 | lo);
        }
        Some(Self::from_bytes(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u64> for SerialNumber {
    fn from(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("00");
        }
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({self})")
    }
}

/// How a presented certificate chain is judged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Accept any chain, including none.
    #[default]
    Unverified,
    /// Require a certificate in the chain with this serial number.
    PinnedSerial(SerialNumber),
    /// Require a non-empty chain whose leaf is currently within its validity window.
    ValidityChecked,
}

impl TrustPolicy {
    /// Build from the legacy pair of knobs. A pin takes precedence over `verify`.
    pub fn from_flags(verify: bool, pin: Option<SerialNumber>) -> Self {
        match (pin, verify) {
            (Some(serial), _) => TrustPolicy::PinnedSerial(serial),
            (None, true) => TrustPolicy::ValidityChecked,
            (None, false) => TrustPolicy::Unverified,
        }
    }

    pub fn is_verified(&self) -> bool {
        !matches!(self, TrustPolicy::Unverified)
    }

    /// Judge `chain` (leaf first) as presented by `peer`.
    pub fn check_chain(&self, peer: Peer, chain: Option<&[CertificateDer<'_>]>) -> Result<(), TrustFailure> {
        match self {
            TrustPolicy::Unverified => Ok(()),
            TrustPolicy::PinnedSerial(pin) => {
                let chain = chain.ok_or_else(|| TrustFailure::new(peer, TrustFailureReason::ChainMissing))?;
                let matched = chain.iter().any(|der| {
                    x509_parser::parse_x509_certificate(der.as_ref())
                        .map(|(_, cert)| SerialNumber::from_bytes(cert.raw_serial()) == *pin)
                        .unwrap_or(false)
                });
                if matched {
                    Ok(())
                } else {
                    Err(TrustFailure::new(peer, TrustFailureReason::NoMatchingSerial))
                }
            }
            TrustPolicy::ValidityChecked => {
                let leaf = chain
                    .and_then(|c| c.first())
                    .ok_or_else(|| TrustFailure::new(peer, TrustFailureReason::ChainMissing))?;
                let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
                    .map_err(|e| TrustFailure::new(peer, TrustFailureReason::Unparseable(e.to_string())))?;
                if cert.validity().is_valid() {
                    Ok(())
                } else {
                    Err(TrustFailure::new(peer, TrustFailureReason::NotTimeValid))
                }
            }
        }
    }
}

/// Verification contract invoked during a handshake, one method per direction.
pub trait TrustCheck {
    fn check_server_trusted(&self, chain: Option<&[CertificateDer<'_>]>) -> Result<(), TrustFailure>;

    fn check_client_trusted(&self, chain: Option<&[CertificateDer<'_>]>) -> Result<(), TrustFailure>;

    /// Issuers advertised to the peer. Issuer validation is not performed, so none.
    fn accepted_issuers(&self) -> &[DistinguishedName] {
        &[]
    }
}

impl TrustCheck for TrustPolicy {
    fn check_server_trusted(&self, chain: Option<&[CertificateDer<'_>]>) -> Result<(), TrustFailure> {
        self.check_chain(Peer::Server, chain)
    }

    fn check_client_trusted(&self, chain: Option<&[CertificateDer<'_>]>) -> Result<(), TrustFailure> {
        self.check_chain(Peer::Client, chain)
    }
}

/// Where an adapter records the failure that aborted its handshake.
pub type FailureSlot = Arc<Mutex<Option<TrustFailure>>>;

fn full_chain<'a>(end_entity: &CertificateDer<'a>, intermediates: &[CertificateDer<'a>]) -> Vec<CertificateDer<'a>> {
    let mut chain = Vec::with_capacity(intermediates.len() + 1);
    chain.push(end_entity.clone());
    chain.extend(intermediates.iter().cloned());
    chain
}

fn reject(slot: &FailureSlot, failure: TrustFailure) -> rustls::Error {
    debug!("rejecting certificate chain: {failure}");
    if let Ok(mut last) = slot.lock() {
        *last = Some(failure.clone());
    }
    rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(failure))))
}

/// Server-certificate verifier for a client handshake.
#[derive(Debug)]
pub struct ServerVerifier {
    policy: TrustPolicy,
    algorithms: WebPkiSupportedAlgorithms,
    failure: FailureSlot,
}

impl ServerVerifier {
    pub fn new(policy: TrustPolicy, provider: &CryptoProvider) -> Self {
        Self {
            policy,
            algorithms: provider.signature_verification_algorithms,
            failure: FailureSlot::default(),
        }
    }

    pub fn failure_slot(&self) -> FailureSlot {
        Arc::clone(&self.failure)
    }
}

impl ServerCertVerifier for ServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain = full_chain(end_entity, intermediates);
        self.policy
            .check_server_trusted(Some(chain.as_slice()))
            .map(|()| ServerCertVerified::assertion())
            .map_err(|failure| reject(&self.failure, failure))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Client-certificate verifier for a server handshake.
#[derive(Debug)]
pub struct ClientVerifier {
    policy: TrustPolicy,
    algorithms: WebPkiSupportedAlgorithms,
    failure: FailureSlot,
}

impl ClientVerifier {
    pub fn new(policy: TrustPolicy, provider: &CryptoProvider) -> Self {
        Self {
            policy,
            algorithms: provider.signature_verification_algorithms,
            failure: FailureSlot::default(),
        }
    }

    pub fn failure_slot(&self) -> FailureSlot {
        Arc::clone(&self.failure)
    }
}

impl ClientCertVerifier for ClientVerifier {
    fn client_auth_mandatory(&self) -> bool {
        self.policy.is_verified()
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.policy.accepted_issuers()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let chain = full_chain(end_entity, intermediates);
        self.policy
            .check_client_trusted(Some(chain.as_slice()))
            .map(|()| ClientCertVerified::assertion())
            .map_err(|failure| reject(&self.failure, failure))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// A rustls client configuration that judges servers with `policy`, plus
/// the slot its verifier reports failures into.
pub fn client_config(policy: &TrustPolicy) -> Result<(rustls::ClientConfig, FailureSlot), Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(ServerVerifier::new(policy.clone(), &provider));
    let slot = verifier.failure_slot();
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::transport(format!("TLS setup failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok((config, slot))
}
