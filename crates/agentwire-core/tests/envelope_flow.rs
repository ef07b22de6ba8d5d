//! Integration tests for packing and unwrapping envelopes with real keys.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use agentwire_core::harness::RecordingCapability;
use agentwire_core::relay::{ForwardRelay, RelayOutcome};
use agentwire_core::{
    EnvelopeConfig, EnvelopeError, EnvelopeKeys, EnvelopeService, Layer, WalletCapability,
    WireMessage,
};

#[derive(Serialize)]
struct BasicMessage {
    #[serde(rename = "@type")]
    message_type: String,
    #[serde(rename = "@id")]
    id: String,
    content: String,
}

fn hello() -> BasicMessage {
    BasicMessage {
        message_type: "https://didcomm.org/basicmessage/1.0/message".into(),
        id: "msg-1".into(),
        content: "hello".into(),
    }
}

/// One agent: its own wallet and an envelope service over it.
struct Agent {
    service: Arc<EnvelopeService>,
    key: String,
}

impl Agent {
    async fn new(config: EnvelopeConfig) -> Self {
        let capability = WalletCapability::default();
        let key = capability.create_key().await;
        Self {
            service: Arc::new(EnvelopeService::new(Arc::new(capability), config)),
            key,
        }
    }
}

#[tokio::test]
async fn test_direct_authenticated_delivery() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;

    let wire = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()]).with_sender_key(sender.key.clone()),
        )
        .await
        .expect("pack should succeed");

    let context = recipient.service.unpack_message(&wire).await.unwrap();
    assert_eq!(context.message["content"], "hello");
    assert_eq!(context.message["@type"], "https://didcomm.org/basicmessage/1.0/message");
    assert_eq!(context.sender_key.as_deref(), Some(sender.key.as_str()));
    assert_eq!(context.recipient_key, recipient.key);
    assert!(!context.is_forward());
}

#[tokio::test]
async fn test_anonymous_delivery_has_no_sender() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;

    let wire = sender
        .service
        .pack_message(&hello(), EnvelopeKeys::new([recipient.key.clone()]))
        .await
        .unwrap();

    let context = recipient.service.unpack_message(&wire).await.unwrap();
    assert!(context.sender_key.is_none());
}

#[tokio::test]
async fn test_single_mediator() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;
    let mediator = Agent::new(EnvelopeConfig::default()).await;

    let wire = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()])
                .with_routing_keys([mediator.key.clone()])
                .with_sender_key(sender.key.clone()),
        )
        .await
        .unwrap();

    // the recipient cannot read the outer layer
    let err = recipient.service.unpack_message(&wire).await.unwrap_err();
    assert_eq!(err.layer(), Some(Layer::Unpack));

    let outer = mediator.service.unpack_message(&wire).await.unwrap();
    assert!(outer.is_forward());
    assert!(outer.sender_key.is_none());
    let forward = outer.into_forward().unwrap();
    assert_eq!(forward.to, recipient.key);

    let inner = recipient.service.unpack_message(&forward.message).await.unwrap();
    assert_eq!(inner.message["content"], "hello");
    assert_eq!(inner.sender_key.as_deref(), Some(sender.key.as_str()));
}

#[tokio::test]
async fn test_two_mediators_through_relays() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;
    let m1 = Agent::new(EnvelopeConfig::default()).await;
    let m2 = Agent::new(EnvelopeConfig::default()).await;

    let wire = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()])
                .with_routing_keys([m1.key.clone(), m2.key.clone()])
                .with_sender_key(sender.key.clone()),
        )
        .await
        .unwrap();

    // the transport hands bytes to the outermost mediator
    let bytes = wire.to_bytes().unwrap();
    let m2_relay = ForwardRelay::new(m2.service.clone());
    let RelayOutcome::Forward { to, message } = m2_relay.process_bytes(&bytes).await.unwrap() else {
        panic!("M2 should forward");
    };
    assert_eq!(to, m1.key);

    let m1_relay = ForwardRelay::new(m1.service.clone());
    let RelayOutcome::Forward { to, message } = m1_relay.process(&message).await.unwrap() else {
        panic!("M1 should forward");
    };
    assert_eq!(to, recipient.key);

    let r_relay = ForwardRelay::new(recipient.service.clone());
    let RelayOutcome::Deliver(context) = r_relay.process(&message).await.unwrap() else {
        panic!("R1 should receive the payload");
    };
    assert_eq!(context.message["content"], "hello");
    assert_eq!(context.sender_key.as_deref(), Some(sender.key.as_str()));

    assert_eq!(m2_relay.stats().snapshot().forwarded, 1);
    assert_eq!(m1_relay.stats().snapshot().forwarded, 1);
    assert_eq!(r_relay.stats().snapshot().delivered, 1);
}

#[tokio::test]
async fn test_legacy_prefix_on_every_layer() {
    let config = EnvelopeConfig::default().with_legacy_did_sov_prefix(true);
    let sender = Agent::new(config.clone()).await;
    let recipient = Agent::new(config.clone()).await;
    let mediator = Agent::new(config).await;

    let wire = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()]).with_routing_keys([mediator.key.clone()]),
        )
        .await
        .unwrap();

    let outer = mediator.service.unpack_message(&wire).await.unwrap();
    assert_eq!(
        outer.type_uri(),
        Some("did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/forward")
    );
    assert!(outer.is_forward());

    let inner = recipient
        .service
        .unpack_message(&outer.into_forward().unwrap().message)
        .await
        .unwrap();
    assert_eq!(
        inner.type_uri(),
        Some("did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/basicmessage/1.0/message")
    );
    assert_eq!(inner.message_type().unwrap().name, "message");
}

#[tokio::test]
async fn test_unknown_routing_key_fails_whole_pack() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;

    let err = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()]).with_routing_keys(["not-a-key"]),
        )
        .await
        .unwrap_err();

    match err {
        EnvelopeError::CryptoOperation { layer, key, .. } => {
            assert_eq!(layer, Layer::Forward { hop: 0 });
            assert_eq!(key.as_deref(), Some("not-a-key"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_sender_key_fails_inner_layer() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;

    let err = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()]).with_sender_key(recipient.key.clone()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.layer(), Some(Layer::Inner));
    // the sender wallet does not hold this key
    assert_eq!(err.key(), Some(recipient.key.as_str()));

    let err = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new([recipient.key.clone()]).with_sender_key("UnknownSenderKey"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.layer(), Some(Layer::Inner));
    assert_eq!(err.key(), Some("UnknownSenderKey"));
}

#[tokio::test]
async fn test_bad_recipient_key_is_named_on_inner_layer() {
    let sender = Agent::new(EnvelopeConfig::default()).await;

    let err = sender
        .service
        .pack_message(
            &hello(),
            EnvelopeKeys::new(["not-a-key"]).with_sender_key(sender.key.clone()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.layer(), Some(Layer::Inner));
    assert_eq!(err.key(), Some("not-a-key"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_packs_on_one_service() {
    let service = Arc::new(EnvelopeService::new(
        Arc::new(RecordingCapability::new()),
        EnvelopeConfig::default(),
    ));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                let recipient = format!("R{i}");
                let wire = service
                    .pack_message(
                        &json!({ "content": i }),
                        EnvelopeKeys::new([recipient.clone()])
                            .with_routing_keys([format!("M{i}a"), format!("M{i}b")]),
                    )
                    .await
                    .unwrap();

                let relay = ForwardRelay::new(service);
                let mut message = wire;
                loop {
                    match relay.process(&message).await.unwrap() {
                        RelayOutcome::Forward { message: inner, .. } => message = inner,
                        RelayOutcome::Deliver(context) => return (i, recipient, context),
                    }
                }
            })
        })
        .collect();

    for task in tasks {
        let (i, recipient, context) = task.await.unwrap();
        assert_eq!(context.message["content"], i);
        assert_eq!(context.recipient_key, recipient);
    }
}

#[tokio::test]
async fn test_empty_recipients_rejected() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let result = sender
        .service
        .pack_message(&hello(), EnvelopeKeys::default().with_routing_keys(["M1"]))
        .await;
    assert!(matches!(result, Err(EnvelopeError::Configuration(_))));
}

#[tokio::test]
async fn test_tampered_envelope_is_rejected() {
    let sender = Agent::new(EnvelopeConfig::default()).await;
    let recipient = Agent::new(EnvelopeConfig::default()).await;

    let wire = sender
        .service
        .pack_message(&hello(), EnvelopeKeys::new([recipient.key.clone()]))
        .await
        .unwrap();

    let mut json = wire.into_json();
    let tag = json["tag"].as_str().unwrap().to_string();
    let flipped = if tag.starts_with('A') { "B" } else { "A" };
    json["tag"] = json!(format!("{flipped}{}", &tag[1..]));

    let err = recipient
        .service
        .unpack_message(&WireMessage::new(json))
        .await
        .unwrap_err();
    assert!(err.is_crypto());
}
