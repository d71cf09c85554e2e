mod common;

use common::{registry_lock, stack_inits, LoopbackRadio};

use mhm_edge::config::{PeerConfig, CURRENT_NODE_ADDRESS, FUSION_NODE_ADDRESS};
use mhm_edge::links::{on_peer_frame, LinkError, PeerReceiver, PeerSender};
use mhm_edge::CurrentPacket;

#[test]
fn two_sends_before_a_read_keep_only_the_second() {
    let _registry = registry_lock();
    static RX: PeerReceiver = PeerReceiver::new();

    let mut fusion_radio = LoopbackRadio::new(FUSION_NODE_ADDRESS);
    RX.initialize(&mut fusion_radio).unwrap();
    assert!(fusion_radio.has_receive_callback());

    let mut sender = PeerSender::new(LoopbackRadio::new(CURRENT_NODE_ADDRESS), PeerConfig::default());
    sender.initialize().unwrap();
    assert_eq!(sender.radio().peers[0].address, FUSION_NODE_ADDRESS);
    assert!(!sender.radio().peers[0].encrypt);

    sender.send(&CurrentPacket::new(1.0, 2.0, 3.0)).unwrap();
    sender.send(&CurrentPacket::new(4.0, 5.0, 6.0)).unwrap();

    assert!(RX.has_new_packet());
    assert_eq!(RX.latest(), CurrentPacket::new(4.0, 5.0, 6.0));
    assert!(!RX.has_new_packet());
    assert_eq!(RX.stats().overwritten, 1);

    let stats = sender.stats();
    assert_eq!(stats.accepted, 2);
    assert!(stats.delivered >= 2);
}

#[test]
fn malformed_frames_never_reach_the_slot() {
    let _registry = registry_lock();
    static RX: PeerReceiver = PeerReceiver::new();
    RX.initialize(&mut LoopbackRadio::new(FUSION_NODE_ADDRESS)).unwrap();

    on_peer_frame(&CURRENT_NODE_ADDRESS, &CurrentPacket::new(0.5, 0.5, 0.5).to_bytes());
    RX.latest();

    on_peer_frame(&CURRENT_NODE_ADDRESS, &[0u8; 11]);
    on_peer_frame(&CURRENT_NODE_ADDRESS, &[0u8; 13]);
    on_peer_frame(&CURRENT_NODE_ADDRESS, &[]);

    assert!(!RX.has_new_packet());
    assert_eq!(RX.latest(), CurrentPacket::new(0.5, 0.5, 0.5));
    assert_eq!(RX.stats().malformed, 3);
}

#[test]
fn reinitializing_redirects_the_callback() {
    let _registry = registry_lock();
    static FIRST: PeerReceiver = PeerReceiver::new();
    static SECOND: PeerReceiver = PeerReceiver::new();
    let mut radio = LoopbackRadio::new(FUSION_NODE_ADDRESS);

    FIRST.initialize(&mut radio).unwrap();
    SECOND.initialize(&mut radio).unwrap();
    on_peer_frame(&CURRENT_NODE_ADDRESS, &CurrentPacket::new(9.0, 9.0, 9.0).to_bytes());

    assert!(!FIRST.has_new_packet());
    assert_eq!(SECOND.take(), Some(CurrentPacket::new(9.0, 9.0, 9.0)));
}

#[test]
fn filtered_receiver_ignores_other_stations() {
    let _registry = registry_lock();
    static RX: PeerReceiver = PeerReceiver::with_sender_filter(CURRENT_NODE_ADDRESS);
    RX.initialize(&mut LoopbackRadio::new(FUSION_NODE_ADDRESS)).unwrap();

    let mut stranger = PeerSender::new(
        LoopbackRadio::new(mhm_edge::links::PeerAddress([0x02, 0, 0, 0, 0, 0x77])),
        PeerConfig::default(),
    );
    stranger.initialize().unwrap();
    stranger.send(&CurrentPacket::new(3.0, 3.0, 3.0)).unwrap();

    assert_eq!(RX.take(), None);
    assert_eq!(RX.stats().foreign, 1);
}

#[test]
fn send_before_initialize_is_refused() {
    let mut sender = PeerSender::new(LoopbackRadio::new(CURRENT_NODE_ADDRESS), PeerConfig::default());
    let result = sender.send(&CurrentPacket::new(1.0, 1.0, 1.0));

    assert!(matches!(result, Err(LinkError::NotInitialized)));
    assert!(sender.radio().sent.is_empty());
}

#[test]
fn stack_refusal_is_reported_and_counted() {
    let _registry = registry_lock();
    let mut radio = LoopbackRadio::new(CURRENT_NODE_ADDRESS);
    radio.refuse_sends = true;
    radio.deliver = false;
    let mut sender = PeerSender::new(radio, PeerConfig::default());
    sender.initialize().unwrap();

    assert!(matches!(
        sender.send(&CurrentPacket::new(1.0, 1.0, 1.0)),
        Err(LinkError::Radio(_))
    ));
    assert_eq!(sender.stats().rejected, 1);
}

#[test]
fn datagram_stack_is_brought_up_once_for_both_roles() {
    let _registry = registry_lock();
    static RX: PeerReceiver = PeerReceiver::new();

    let mut fusion_radio = LoopbackRadio::new(FUSION_NODE_ADDRESS);
    RX.initialize(&mut fusion_radio).unwrap();
    let mut sender = PeerSender::new(LoopbackRadio::new(CURRENT_NODE_ADDRESS), PeerConfig::default());
    sender.initialize().unwrap();
    RX.initialize(&mut fusion_radio).unwrap();

    assert_eq!(stack_inits(), 1);
    assert!(fusion_radio.has_receive_callback());
}
