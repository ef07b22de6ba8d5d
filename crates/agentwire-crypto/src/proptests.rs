#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::envelope::{open, seal};
    use crate::error::CryptoError;
    use crate::jwe::Jwe;
    use crate::keys::KeyPair;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        // Any payload opens back to itself, with or without a sender.
        #[test]
        fn test_seal_open_preserves_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            authenticated in any::<bool>(),
        ) {
            let sender = KeyPair::generate();
            let recipient = KeyPair::generate();
            let jwe = seal(
                &payload,
                &[recipient.verkey()],
                authenticated.then_some(&sender),
            ).unwrap();

            let opened = open(&jwe, |kid| (kid == recipient.verkey()).then(|| recipient.clone())).unwrap();
            prop_assert_eq!(opened.plaintext.as_ref(), payload.as_slice());
            prop_assert_eq!(opened.sender_verkey.is_some(), authenticated);
        }

        // Flipping any ciphertext bit is detected.
        #[test]
        fn test_bit_flip_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            use base64::engine::general_purpose::URL_SAFE_NO_PAD;
            use base64::Engine as _;

            let recipient = KeyPair::generate();
            let jwe = seal(&payload, &[recipient.verkey()], None).unwrap();

            let mut raw = URL_SAFE_NO_PAD.decode(&jwe.ciphertext).unwrap();
            let i = index.index(raw.len());
            raw[i] ^= 1 << bit;
            let tampered = Jwe { ciphertext: URL_SAFE_NO_PAD.encode(&raw), ..jwe };

            let result = open(&tampered, |kid| (kid == recipient.verkey()).then(|| recipient.clone()));
            prop_assert_eq!(result.unwrap_err(), CryptoError::DecryptFailed);
        }
    }
}
