//! Encrypted upstream protocol: payload cipher and the per-region session.

mod crypto;
mod secure;

pub use crypto::PayloadCipher;
pub use secure::{
    HttpTransport, ProtocolHeaders, SecureSession, TransferCredential, Transport,
    TransportResponse,
};
