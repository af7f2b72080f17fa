/*! surface_transfer is the ownership and transfer protocol that lets cooperating compositing
processes share GPU- and shared-memory-backed surfaces without copying pixels.

A producer (say, a content compositor) draws into a surface and *lends* it to a consumer (say, a
display compositor).  The consumer reads it for as long as it likes and then hands it back.  No
pixels move; only a small descriptor carrying a transferable handle and a synchronization token.

The hard part is never getting this wrong:

| Hazard                                   | Guard                                                     |
|------------------------------------------|-----------------------------------------------------------|
| Consumer reads before producer's GPU work finishes | Every GPU transfer carries a verified [SyncToken] the consumer waits on |
| Producer overwrites while consumer reads | Returns carry the consumer's token; the producer waits before reuse |
| Surface freed while someone holds it     | Import/export counts per resource, checked on every decrement |
| Peer disconnects mid-transfer            | [ResourceProvider::destroy_peer] unwinds everything the peer held or lent |
| Stale ids in late messages               | Ids are never reused; returns for vanished resources are ignored |

# Shape

Each process owns one [ResourceProvider], parameterized over a [GraphicsContext] that supplies
handles and fences.  The provider keeps a [ResourceId]-keyed registry and one session per
[PeerId].

```
# use surface_transfer::imp::nop::NopContext;
# use surface_transfer::{FilterType, PixelFormat, ResourceProvider, Size};
# use std::cell::RefCell;
# use std::rc::Rc;
let mut producer = ResourceProvider::new(NopContext::new());
let mut consumer = ResourceProvider::new(NopContext::new());

let returned = Rc::new(RefCell::new(Vec::new()));
let consumer_peer = producer.create_peer(|_| {});
let producer_peer = consumer.create_peer({
    let returned = returned.clone();
    move |batch| returned.borrow_mut().extend(batch)
});

let surface = producer.create_gpu_resource(Size::new(64, 64), PixelFormat::Rgba8Unorm, FilterType::Linear);
let export = producer.export(consumer_peer, &[surface]).unwrap();
consumer.receive(producer_peer, &export.descriptors);
//the consumer's next frame no longer uses it
consumer.declare_in_use(producer_peer, []);
producer.process_returns(consumer_peer, &returned.borrow());
assert_eq!(producer.get(surface).unwrap().exported_count, 0);
```

Delegated resources may be exported onward; the provider forwards returns upstream once every
downstream loan has come back.

# Threading

Nothing here is thread-safe.  A provider belongs to one sequence (typically the compositor
thread) and all calls must come from it.

# Backends

[imp::nop] has no GPU and is always available.  [imp::wgpu] (feature `backend_wgpu`, on by
default) backs handles with wgpu textures and fences with queue submissions.
*/

pub mod context;
pub mod descriptors;
mod error;
pub mod ids;
pub mod imp;
mod peer;
pub mod pixel_formats;
pub mod provider;
mod registry;
mod resource;
pub mod sampler;
pub mod sync_token;

pub use context::{ContextError, GraphicsContext, HandleKind, HandleName, HandleRequest, TransferHandle};
pub use descriptors::{ReturnDescriptor, TransferDescriptor};
pub use error::Error;
pub use ids::{PeerId, ResourceId};
pub use peer::ReturnCallback;
pub use pixel_formats::{PixelFormat, Size};
pub use provider::{ExportOutcome, ReadLock, ResourceProvider};
pub use resource::{Origin, ResourceInfo};
pub use sampler::FilterType;
pub use sync_token::{CommandBufferNamespace, SyncToken};
