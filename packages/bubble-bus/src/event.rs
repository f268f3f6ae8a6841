/// A fact that can be published on the [`EventBus`](crate::EventBus).
///
/// Handlers are keyed by the concrete type; `NAME` is the stable wire name
/// used in logs and by stream consumers (`"BUBBLE_FORMED"`, `"MATCH_CREATED"`).
pub trait Event: Send + Sync + 'static {
    const NAME: &'static str;
}
