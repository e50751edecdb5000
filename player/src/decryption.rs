//! The decryption seam.

use rialto_common::media::EncryptionDescriptor;
use rialto_common::RialtoResult;

pub trait DecryptionService: Send + Sync {
    /// Decrypt `data` in place using `descriptor`, returning the plaintext
    /// bytes to attach to the framework buffer.
    fn decrypt(&self, data: &[u8], descriptor: &EncryptionDescriptor) -> RialtoResult<Vec<u8>>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::DecryptionService;
    use rialto_common::media::EncryptionDescriptor;
    use rialto_common::RialtoResult;

    /// Identity "decryption" for tests: returns the input unchanged.
    pub struct NoopDecryptionService;

    impl DecryptionService for NoopDecryptionService {
        fn decrypt(&self, data: &[u8], _descriptor: &EncryptionDescriptor) -> RialtoResult<Vec<u8>> {
            Ok(data.to_vec())
        }
    }
}
