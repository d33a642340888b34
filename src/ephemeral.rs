use crate::backends::error::PointError;
use crate::points::KeyPoint;
use crate::traits::Affine;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use aes_gcm::aead::Aead;
use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use hkdf::Hkdf;
use rand_core::RngCore;
use sha2::Sha256;

// Pairwise channel encryption: Diffie–Hellman on per-run ephemeral keys,
// HKDF-SHA256 for the symmetric key, AES-256-GCM with a random nonce.

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HKDF_INFO: &[u8] = b"gjkr-pairwise-symmetric-key";

/// Failures of the pairwise key agreement and of share encryption.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EphemeralError {
    #[error("peer ephemeral public key: {0}")]
    PeerPublicKey(PointError),
    #[error("hkdf: invalid number of blocks")]
    Hkdf,
    #[error("decrypt: ciphertext too short: {0} bytes")]
    DecrTooShort(usize),
    #[error("decrypt: aead error")]
    DecrAead,
    #[error("encrypt: aead error")]
    EncrAead,
}

/// Ephemeral key pair generated for one peer for the duration of one run.
pub struct EphemeralKeyPair<S: Scheme> {
    private: S::Scalar,
    public: KeyPoint<S>,
}

impl<S: Scheme> EphemeralKeyPair<S> {
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        Self::from_private(S::Scalar::random(rng))
    }

    pub fn from_private(private: S::Scalar) -> Self {
        let public = S::sk_to_pk(&private);
        Self { private, public }
    }

    pub fn public(&self) -> &KeyPoint<S> {
        &self.public
    }

    /// The private key only leaves the member when it is revealed to back an
    /// accusation against the peer the key pair was generated for.
    pub fn private(&self) -> &S::Scalar {
        &self.private
    }

    /// Key agreement with the ephemeral public key the peer generated for us.
    pub fn agree(&self, peer_public: &KeyPoint<S>) -> Result<SymmetricKey, EphemeralError> {
        SymmetricKey::derive::<S>(&self.private, peer_public)
    }
}

/// Checks that `private` is the discrete log of `public`.
pub fn is_key_pair<S: Scheme>(private: &S::Scalar, public: &KeyPoint<S>) -> bool {
    S::sk_to_pk(private) == *public
}

/// Symmetric key shared by one pair of members.
#[derive(Clone, PartialEq)]
pub struct SymmetricKey {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl SymmetricKey {
    pub fn derive<S: Scheme>(
        private: &S::Scalar,
        peer_public: &KeyPoint<S>,
    ) -> Result<Self, EphemeralError> {
        if peer_public.is_identity() {
            return Err(EphemeralError::PeerPublicKey(PointError::Identity));
        }
        let shared: KeyPoint<S> = (*private * peer_public).into();
        let ikm = shared.serialize();

        let mut key = [0; KEY_LEN];
        Hkdf::<Sha256>::new(None, &ikm)
            .expand(HKDF_INFO, &mut key)
            .map_err(|_| EphemeralError::Hkdf)?;

        Ok(Self { key })
    }

    /// Both members of a pair encrypt under the same key, so every message
    /// gets a fresh random nonce which is prepended to the ciphertext.
    pub fn encrypt<R: RngCore>(&self, plain: &[u8], rng: &mut R) -> Result<Vec<u8>, EphemeralError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut c = aes
            .encrypt(Nonce::from_slice(&nonce), plain)
            .map_err(|_| EphemeralError::EncrAead)?;

        let mut out = nonce.to_vec();
        out.append(&mut c);

        Ok(out)
    }

    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, EphemeralError> {
        if cipher.len() < NONCE_LEN + TAG_LEN {
            return Err(EphemeralError::DecrTooShort(cipher.len()));
        }
        let (nonce, msg) = cipher.split_at(NONCE_LEN);

        let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        aes.decrypt(Nonce::from_slice(nonce), msg)
            .map_err(|_| EphemeralError::DecrAead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemes::DefaultScheme;
    use crate::schemes::SigsOnG1Scheme;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    fn pairwise_keys_match<S: Scheme>() {
        let mut rng = ChaChaRng::from_seed([9u8; 32]);
        // key pair member 1 generated for member 2 and the other way around
        let kp12 = EphemeralKeyPair::<S>::generate(&mut rng);
        let kp21 = EphemeralKeyPair::<S>::generate(&mut rng);

        let k12 = kp12.agree(kp21.public()).unwrap();
        let k21 = kp21.agree(kp12.public()).unwrap();
        assert_eq!(k12, k21);

        let cipher = k12.encrypt(b"share", &mut rng).unwrap();
        assert_eq!(k21.decrypt(&cipher).unwrap(), b"share");
    }

    #[test]
    fn test_pairwise_keys_match() {
        pairwise_keys_match::<DefaultScheme>();
        pairwise_keys_match::<SigsOnG1Scheme>();
    }

    #[test]
    fn both_directions_never_reuse_a_nonce() {
        let mut rng = ChaChaRng::from_seed([10u8; 32]);
        let kp = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let peer = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let key = kp.agree(peer.public()).unwrap();

        let c1 = key.encrypt(b"same", &mut rng).unwrap();
        let c2 = key.encrypt(b"same", &mut rng).unwrap();
        assert_ne!(c1[..NONCE_LEN], c2[..NONCE_LEN]);
    }

    #[test]
    fn wrong_key_or_tampered_cipher_fails() {
        let mut rng = ChaChaRng::from_seed([11u8; 32]);
        let kp = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let peer = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let other = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let key = kp.agree(peer.public()).unwrap();
        let wrong = kp.agree(other.public()).unwrap();

        let mut cipher = key.encrypt(b"share", &mut rng).unwrap();
        assert_eq!(wrong.decrypt(&cipher), Err(EphemeralError::DecrAead));

        let last = cipher.len() - 1;
        cipher[last] ^= 1;
        assert_eq!(key.decrypt(&cipher), Err(EphemeralError::DecrAead));
        assert_eq!(key.decrypt(&cipher[..10]), Err(EphemeralError::DecrTooShort(10)));
    }

    #[test]
    fn revealed_private_key_is_checked_against_public() {
        let mut rng = ChaChaRng::from_seed([12u8; 32]);
        let kp = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let other = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);

        assert!(is_key_pair::<DefaultScheme>(kp.private(), kp.public()));
        assert!(!is_key_pair::<DefaultScheme>(other.private(), kp.public()));
    }

    #[test]
    fn identity_peer_key_is_rejected() {
        let mut rng = ChaChaRng::from_seed([13u8; 32]);
        let kp = EphemeralKeyPair::<DefaultScheme>::generate(&mut rng);
        let identity = KeyPoint::<DefaultScheme>::identity();

        assert_eq!(
            kp.agree(&identity),
            Err(EphemeralError::PeerPublicKey(PointError::Identity))
        );
    }
}
