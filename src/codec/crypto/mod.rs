mod authentication_tag;
mod fingerprint;
mod hash;
mod key_id;
mod nonce;
mod signature;
mod signing_key;
mod symmetric_key;
mod verifying_key;

pub use authentication_tag::AuthenticationTag;
pub use fingerprint::Fingerprint;
pub use hash::{Hash, HASH_SIZE};
pub use key_id::KeyId;
pub use nonce::Nonce;
pub use signature::{Signature, SignatureError};
pub use signing_key::{SigningKey, SigningKeyError};
pub use symmetric_key::{SymmetricKey, SymmetricKeyError};
pub use verifying_key::{VerifyingKey, VerifyingKeyError};
