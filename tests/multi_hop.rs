// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A resource forwarded through an intermediate process goes back upstream only after the
//! downstream loan ends.

use std::cell::RefCell;
use std::rc::Rc;
use surface_transfer::imp::nop::NopContext;
use surface_transfer::{
    CommandBufferNamespace, FilterType, PeerId, PixelFormat, ResourceId, ResourceProvider, ReturnDescriptor,
    Size, SyncToken,
};

type Inbox = Rc<RefCell<Vec<ReturnDescriptor>>>;

fn inbox() -> (Inbox, impl FnMut(Vec<ReturnDescriptor>) + 'static) {
    let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
    let sink = inbox.clone();
    (inbox, move |batch| sink.borrow_mut().extend(batch))
}

fn drain(inbox: &Inbox) -> Vec<ReturnDescriptor> {
    inbox.borrow_mut().drain(..).collect()
}

/// producer -> compositor -> display
struct Chain {
    producer: ResourceProvider<NopContext>,
    compositor: ResourceProvider<NopContext>,
    display: ResourceProvider<NopContext>,
    //as seen from the producer
    producer_to_compositor: PeerId,
    //as seen from the compositor
    compositor_to_producer: PeerId,
    compositor_to_display: PeerId,
    //as seen from the display
    display_to_compositor: PeerId,
    //returns the compositor sent upstream
    to_producer: Inbox,
    //returns the display sent upstream
    to_compositor: Inbox,
}

impl Chain {
    fn new() -> Self {
        let mut producer = ResourceProvider::new(NopContext::new());
        let mut compositor = ResourceProvider::new(NopContext::new());
        let mut display = ResourceProvider::new(NopContext::new());
        let producer_to_compositor = producer.create_peer(|_| {});
        let (to_producer, sink) = inbox();
        let compositor_to_producer = compositor.create_peer(sink);
        let compositor_to_display = compositor.create_peer(|_| {});
        let (to_compositor, sink) = inbox();
        let display_to_compositor = display.create_peer(sink);
        Chain {
            producer,
            compositor,
            display,
            producer_to_compositor,
            compositor_to_producer,
            compositor_to_display,
            display_to_compositor,
            to_producer,
            to_compositor,
        }
    }

    /// Sends a fresh surface all the way down; returns (producer id, compositor id, display id).
    fn forward(&mut self) -> (ResourceId, ResourceId, ResourceId) {
        let surface =
            self.producer
                .create_gpu_resource(Size::new(128, 64), PixelFormat::Bgra8UnormSrgb, FilterType::Linear);
        let outcome = self.producer.export(self.producer_to_compositor, &[surface]).unwrap();
        self.compositor
            .receive(self.compositor_to_producer, &outcome.descriptors);
        let middle = self.compositor.peer_resource_map(self.compositor_to_producer)[&surface];

        let outcome = self.compositor.export(self.compositor_to_display, &[middle]).unwrap();
        self.display
            .receive(self.display_to_compositor, &outcome.descriptors);
        let last = self.display.peer_resource_map(self.display_to_compositor)[&middle];
        (surface, middle, last)
    }
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn forwarded_resource_shares_the_original_handle() {
    let mut chain = Chain::new();
    let (surface, middle, last) = chain.forward();
    let original = chain.producer.get(surface).unwrap();
    let forwarded = chain.display.get(last).unwrap();
    assert_eq!(forwarded.handle, original.handle);
    assert_eq!(forwarded.sync_token, original.sync_token);
    assert_eq!(chain.compositor.get(middle).unwrap().exported_count, 1);
    //forwarding a verified token needs no synchronization in the middle
    assert_eq!(chain.compositor.context().fences_inserted(), 0);
    assert_eq!(chain.compositor.context().verify_calls(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn return_is_forwarded_after_downstream_returns() {
    let mut chain = Chain::new();
    let (surface, middle, _) = chain.forward();

    //the compositor no longer needs it, but the display still does
    chain
        .compositor
        .declare_in_use(chain.compositor_to_producer, []);
    assert!(chain.to_producer.borrow().is_empty());
    assert!(chain.compositor.get(middle).unwrap().marked_for_deletion);

    chain.display.declare_in_use(chain.display_to_compositor, []);
    let returns = drain(&chain.to_compositor);
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].id, middle);
    chain
        .compositor
        .process_returns(chain.compositor_to_display, &returns);

    let returns = drain(&chain.to_producer);
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].id, surface);
    assert_eq!(returns[0].count, 1);
    assert!(chain.compositor.get(middle).is_none());

    chain
        .producer
        .process_returns(chain.producer_to_compositor, &returns);
    assert_eq!(chain.producer.get(surface).unwrap().exported_count, 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn downstream_token_travels_upstream() {
    let mut chain = Chain::new();
    let (surface, _, last) = chain.forward();

    let lock = chain.display.lock_for_read(last).unwrap();
    chain.display.unlock_for_read(lock);
    chain.display.declare_in_use(chain.display_to_compositor, []);
    let returns = drain(&chain.to_compositor);
    let display_token = returns[0].sync_token.unwrap();
    assert!(display_token.is_verified());
    chain
        .compositor
        .process_returns(chain.compositor_to_display, &returns);
    //the compositor never read it, so it only records the token
    assert!(chain.compositor.context().waited_tokens().is_empty());

    chain
        .compositor
        .declare_in_use(chain.compositor_to_producer, []);
    let returns = drain(&chain.to_producer);
    assert_eq!(returns[0].sync_token, Some(display_token));
    chain
        .producer
        .process_returns(chain.producer_to_compositor, &returns);
    assert_eq!(chain.producer.context().waited_tokens(), &[display_token]);
    assert_eq!(chain.producer.get(surface).unwrap().exported_count, 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn middle_reads_are_fenced_after_downstream_token() {
    let mut chain = Chain::new();
    let (_, middle, last) = chain.forward();
    let lock = chain.compositor.lock_for_read(middle).unwrap();
    chain.compositor.unlock_for_read(lock);
    let lock = chain.display.lock_for_read(last).unwrap();
    chain.display.unlock_for_read(lock);

    chain.display.declare_in_use(chain.display_to_compositor, []);
    let returns = drain(&chain.to_compositor);
    let display_token = returns[0].sync_token.unwrap();
    chain
        .compositor
        .process_returns(chain.compositor_to_display, &returns);
    //the compositor's own reads still need fencing, so it orders itself after the display
    assert_eq!(chain.compositor.context().waited_tokens().last(), Some(&display_token));

    chain
        .compositor
        .declare_in_use(chain.compositor_to_producer, []);
    let returns = drain(&chain.to_producer);
    let token = returns[0].sync_token.unwrap();
    assert_ne!(token, display_token);
    assert_eq!(chain.compositor.context().fences_inserted(), 1);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn releases_from_two_downstream_peers_are_both_honored() {
    let mut chain = Chain::new();
    let (surface, middle, _) = chain.forward();
    let overlay = chain.compositor.create_peer(|_| {});
    chain.compositor.export(overlay, &[middle]).unwrap();
    assert_eq!(chain.compositor.get(middle).unwrap().exported_count, 2);
    chain
        .compositor
        .declare_in_use(chain.compositor_to_producer, []);

    let display_token = SyncToken::new(CommandBufferNamespace::Foreign, 1001, 5).into_verified();
    let overlay_token = SyncToken::new(CommandBufferNamespace::Foreign, 2002, 9).into_verified();
    chain.compositor.process_returns(
        chain.compositor_to_display,
        &[ReturnDescriptor {
            id: middle,
            count: 1,
            sync_token: Some(display_token),
            lost: false,
        }],
    );
    //one release outstanding is simply forwarded
    assert!(chain.compositor.context().waited_tokens().is_empty());
    chain.compositor.process_returns(
        overlay,
        &[ReturnDescriptor {
            id: middle,
            count: 1,
            sync_token: Some(overlay_token),
            lost: false,
        }],
    );
    assert_eq!(
        chain.compositor.context().waited_tokens(),
        &[display_token, overlay_token]
    );

    let returns = drain(&chain.to_producer);
    assert_eq!(returns.len(), 1);
    let upstream_token = returns[0].sync_token.unwrap();
    assert!(upstream_token.is_verified());
    assert_ne!(upstream_token, display_token);
    assert_ne!(upstream_token, overlay_token);
    assert_eq!(chain.compositor.context().fences_inserted(), 1);

    chain
        .producer
        .process_returns(chain.producer_to_compositor, &returns);
    assert_eq!(chain.producer.context().waited_tokens(), &[upstream_token]);
    assert_eq!(chain.producer.get(surface).unwrap().exported_count, 0);
}
