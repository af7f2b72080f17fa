// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Tearing down a peer session unwinds everything it held and everything it lent.

use std::cell::RefCell;
use std::rc::Rc;
use surface_transfer::imp::nop::NopContext;
use surface_transfer::{
    FilterType, HandleKind, HandleName, PixelFormat, ResourceId, ResourceProvider, ReturnDescriptor, Size,
    TransferDescriptor, TransferHandle,
};

fn descriptor(peer_resource_id: u32) -> TransferDescriptor {
    TransferDescriptor {
        peer_resource_id: ResourceId(peer_resource_id),
        handle: TransferHandle {
            kind: HandleKind::SharedMemory,
            name: HandleName::from_serial(12, peer_resource_id as u64),
        },
        sync_token: None,
        size: Size::new(32, 32),
        format: PixelFormat::Rgba8Unorm,
        is_software: true,
        filter: FilterType::Linear,
    }
}

fn surface(provider: &mut ResourceProvider<NopContext>) -> ResourceId {
    provider.create_gpu_resource(Size::new(32, 32), PixelFormat::Rgba8UnormSrgb, FilterType::Linear)
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn destroying_peer_drops_its_resources() {
    let mut consumer = ResourceProvider::new(NopContext::new());
    let sent = Rc::new(RefCell::new(0));
    let peer = consumer.create_peer({
        let sent = sent.clone();
        move |_| *sent.borrow_mut() += 1
    });
    consumer.receive(peer, &[descriptor(1), descriptor(2)]);
    let ids = consumer.resource_ids();
    assert_eq!(ids.len(), 2);
    for &id in &ids {
        assert_eq!(consumer.get(id).unwrap().imported_count, 1);
    }

    consumer.destroy_peer(peer);
    for id in ids {
        assert!(consumer.get(id).is_none());
    }
    assert_eq!(consumer.resource_count(), 0);
    //nobody to send to
    assert_eq!(*sent.borrow(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn destroying_peer_ends_its_loans() {
    let mut producer = ResourceProvider::new(NopContext::new());
    let peer = producer.create_peer(|_| {});
    let kept = surface(&mut producer);
    let released = surface(&mut producer);
    producer.export(peer, &[kept, released, released]).unwrap();
    producer.release(released).unwrap();
    assert_eq!(producer.get(released).unwrap().exported_count, 2);

    producer.destroy_peer(peer);
    assert_eq!(producer.get(kept).unwrap().exported_count, 0);
    assert!(producer.get(released).is_none());
    assert_eq!(producer.context().released_handles().len(), 1);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn loans_to_other_peers_survive_teardown() {
    let mut producer = ResourceProvider::new(NopContext::new());
    let first = producer.create_peer(|_| {});
    let second = producer.create_peer(|_| {});
    let r1 = surface(&mut producer);
    producer.export(first, &[r1]).unwrap();
    producer.export(second, &[r1]).unwrap();
    producer.release(r1).unwrap();

    producer.destroy_peer(first);
    let info = producer.get(r1).unwrap();
    assert_eq!(info.exported_count, 1);
    assert!(info.marked_for_deletion);
    assert_eq!(producer.loans_to_peer(second, r1), 1);

    producer.process_returns(
        second,
        &[ReturnDescriptor {
            id: r1,
            count: 1,
            sync_token: None,
            lost: false,
        }],
    );
    assert!(producer.get(r1).is_none());
    //deleted exactly once; a second release would have panicked in the context
    assert_eq!(producer.context().released_handles().len(), 1);
    assert_eq!(producer.context().live_handle_count(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn returns_for_vanished_resources_are_ignored() {
    //upstream -> middle -> downstream; upstream goes away while downstream still holds a loan
    let mut middle = ResourceProvider::new(NopContext::new());
    let upstream = middle.create_peer(|_| {});
    let downstream = middle.create_peer(|_| {});
    middle.receive(upstream, &[descriptor(5)]);
    let local = middle.resource_ids()[0];
    middle.export(downstream, &[local]).unwrap();
    assert_eq!(middle.loans_to_peer(downstream, local), 1);

    middle.destroy_peer(upstream);
    assert!(middle.get(local).is_none());
    assert_eq!(middle.loans_to_peer(downstream, local), 0);

    middle.process_returns(
        downstream,
        &[ReturnDescriptor {
            id: local,
            count: 1,
            sync_token: None,
            lost: false,
        }],
    );
    assert_eq!(middle.resource_count(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn reads_may_outlive_the_owner() {
    let mut consumer = ResourceProvider::new(NopContext::new());
    let peer = consumer.create_peer(|_| {});
    consumer.receive(peer, &[descriptor(3)]);
    let local = consumer.resource_ids()[0];
    let lock = consumer.lock_for_read(local).unwrap();
    consumer.destroy_peer(peer);
    assert!(consumer.get(local).is_none());
    consumer.unlock_for_read(lock);
    assert_eq!(consumer.resource_count(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
#[should_panic(expected = "unknown peer")]
fn destroyed_peer_is_unknown() {
    let mut consumer = ResourceProvider::new(NopContext::new());
    let peer = consumer.create_peer(|_| {});
    consumer.destroy_peer(peer);
    consumer.receive(peer, &[descriptor(1)]);
}
