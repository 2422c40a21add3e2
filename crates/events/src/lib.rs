//! Domain events and the in-process pub/sub used to hand them to external
//! subscribers (notification dispatchers, SSE streams).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{BusPublisher, Notification, NotificationPublisher};
