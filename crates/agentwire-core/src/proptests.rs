#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::config::EnvelopeConfig;
    use crate::envelope::EnvelopeService;
    use crate::harness::RecordingCapability;
    use crate::message::{to_current_prefix, to_legacy_prefix, DIDCOMM_PREFIX};
    use crate::relay::{ForwardRelay, RelayOutcome};
    use crate::types::EnvelopeKeys;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn key() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{8,16}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        // N routing keys cost N + 1 capability calls and peel back in reverse order.
        #[test]
        fn test_routing_chain_unwinds_to_payload(
            recipients in proptest::collection::vec(key(), 1..4),
            routing in proptest::collection::vec(key(), 0..6),
            legacy in any::<bool>(),
            text in ".{0,64}",
        ) {
            let rt = runtime();
            let cap = Arc::new(RecordingCapability::new());
            let service = Arc::new(EnvelopeService::new(
                cap.clone(),
                EnvelopeConfig::default().with_legacy_did_sov_prefix(legacy),
            ));
            let relay = ForwardRelay::new(service.clone());
            let payload = json!({ "@type": "https://didcomm.org/basicmessage/1.0/message", "content": text.clone() });

            let keys = EnvelopeKeys::new(recipients.clone())
                .with_routing_keys(routing.clone())
                .with_sender_key("sender");
            let mut wire = rt.block_on(service.pack_message(&payload, keys)).unwrap();
            prop_assert_eq!(cap.calls().len(), routing.len() + 1);

            // expected `to` per peeled layer: outermost first
            let mut expected_to: Vec<String> = std::iter::once(recipients[0].clone())
                .chain(routing.iter().cloned())
                .collect();
            expected_to.pop();
            expected_to.reverse();

            for to in expected_to {
                match rt.block_on(relay.process(&wire)).unwrap() {
                    RelayOutcome::Forward { to: got, message } => {
                        prop_assert_eq!(got, to);
                        wire = message;
                    }
                    RelayOutcome::Deliver(_) => {
                        prop_assert!(false, "delivered too early");
                    }
                }
            }

            match rt.block_on(relay.process(&wire)).unwrap() {
                RelayOutcome::Deliver(context) => {
                    prop_assert_eq!(&context.message["content"], &json!(text));
                    prop_assert_eq!(context.sender_key.as_deref(), Some("sender"));
                    prop_assert_eq!(context.recipient_key, recipients[0].clone());
                }
                RelayOutcome::Forward { .. } => {
                    prop_assert!(false, "extra forward layer");
                }
            }
        }

        // A failure at any call leaves no envelope and stops further calls.
        #[test]
        fn test_failure_at_any_call_is_atomic(
            hops in 1usize..6,
            fail_seed in any::<prop::sample::Index>(),
        ) {
            let fail_at = fail_seed.index(hops + 1);
            let rt = runtime();
            let cap = Arc::new(RecordingCapability::new().failing_at(fail_at));
            let service = EnvelopeService::new(cap.clone(), EnvelopeConfig::default());
            let routing: Vec<String> = (0..hops).map(|i| format!("M{}", i + 1)).collect();

            let result = rt.block_on(service.pack_message(
                &json!({ "type": "ping" }),
                EnvelopeKeys::new(["R1"]).with_routing_keys(routing.clone()),
            ));

            let err = result.unwrap_err();
            prop_assert!(err.is_crypto());
            prop_assert_eq!(cap.attempts(), fail_at + 1);
            if fail_at == 0 {
                prop_assert_eq!(err.key(), Some("R1"));
            } else {
                prop_assert_eq!(err.key(), Some(routing[fail_at - 1].as_str()));
            }
        }

        #[test]
        fn test_prefix_rewrite_is_reversible(path in "[a-z_]{1,12}/[0-9]\\.[0-9]/[a-z_-]{1,12}") {
            let uri = format!("{DIDCOMM_PREFIX}{path}");
            let legacy = to_legacy_prefix(&uri);
            prop_assert!(legacy.starts_with("did:sov:"));
            prop_assert_eq!(to_current_prefix(&legacy), uri);
        }
    }
}
