//! Per-element attribute streams.
//!
//! A stream is a named, typed, dense array with one slot per element of a
//! given kind (vertex, half-edge, or face), addressed by handle index. The
//! mesh keeps streams in lockstep with its element pools: allocating an
//! element fills its slot in every registered stream with that stream's
//! default value, freeing one tombstones the slot until the index is reused.
//!
//! User code never touches raw slots; access goes through handles on the
//! mesh, which validate generations first.

use std::any::Any;

/// Values storable in an attribute stream.
pub trait StreamValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> StreamValue for T {}

/// Typed identifier of a registered stream, returned by
/// [`StreamSet::register`].
pub struct StreamId<T> {
    slot: usize,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Copy for StreamId<T> {}

impl<T> Clone for StreamId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> std::fmt::Debug for StreamId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamId({})", self.slot)
    }
}

/// A dense attribute array for one element kind.
#[derive(Debug, Clone)]
pub struct AttributeStream<T> {
    name: String,
    data: Vec<T>,
    default: T,
}

impl<T: StreamValue> AttributeStream<T> {
    fn new(name: &str, default: T) -> Self {
        Self {
            name: name.to_string(),
            data: Vec::new(),
            default,
        }
    }

    /// The stream's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the value at a slot index.
    #[inline]
    pub fn get(&self, index: usize) -> &T {
        &self.data[index]
    }

    /// Write the value at a slot index.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.data[index] = value;
    }

    /// The raw slot array, including tombstoned entries.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

trait AnyStream: Send + Sync {
    fn grow_to(&mut self, len: usize);
    fn reset(&mut self, index: usize);
    fn name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: StreamValue> AnyStream for AttributeStream<T> {
    fn grow_to(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, self.default.clone());
        }
    }

    fn reset(&mut self, index: usize) {
        self.data[index] = self.default.clone();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All streams registered for one element kind.
#[derive(Default)]
pub struct StreamSet {
    streams: Vec<Box<dyn AnyStream>>,
}

impl StreamSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream with the value new slots are filled with.
    /// Names must be unique within the set.
    ///
    /// # Panics
    /// Panics if `name` is already registered; registration happens once at
    /// mesh construction, so a clash is a programming error.
    pub fn register<T: StreamValue>(&mut self, name: &str, default: T) -> StreamId<T> {
        assert!(
            self.streams.iter().all(|s| s.name() != name),
            "stream '{}' registered twice",
            name
        );
        let slot = self.streams.len();
        self.streams
            .push(Box::new(AttributeStream::<T>::new(name, default)));
        StreamId {
            slot,
            _marker: std::marker::PhantomData,
        }
    }

    /// Look up a stream id by name and type.
    pub fn find<T: StreamValue>(&self, name: &str) -> Option<StreamId<T>> {
        self.streams
            .iter()
            .position(|s| s.name() == name && s.as_any().is::<AttributeStream<T>>())
            .map(|slot| StreamId {
                slot,
                _marker: std::marker::PhantomData,
            })
    }

    /// Number of registered streams.
    pub fn count(&self) -> usize {
        self.streams.len()
    }

    /// Borrow a stream by id.
    #[inline]
    pub fn stream<T: StreamValue>(&self, id: StreamId<T>) -> &AttributeStream<T> {
        self.streams[id.slot]
            .as_any()
            .downcast_ref()
            .expect("stream id type mismatch")
    }

    /// Mutably borrow a stream by id.
    #[inline]
    pub fn stream_mut<T: StreamValue>(&mut self, id: StreamId<T>) -> &mut AttributeStream<T> {
        self.streams[id.slot]
            .as_any_mut()
            .downcast_mut()
            .expect("stream id type mismatch")
    }

    /// Called when an element is allocated: every stream gains a
    /// default-valued slot at `index`.
    pub(crate) fn on_alloc(&mut self, index: usize) {
        for s in &mut self.streams {
            s.grow_to(index + 1);
            s.reset(index);
        }
    }

    /// Called when an element is freed: the slot is reset so stale data
    /// cannot leak into the next element allocated there.
    pub(crate) fn on_free(&mut self, index: usize) {
        for s in &mut self.streams {
            s.grow_to(index + 1);
            s.reset(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn test_register_and_access() {
        let mut set = StreamSet::new();
        let uv: StreamId<Vector2<f64>> = set.register("texcoord", Vector2::zeros());
        let mat: StreamId<i32> = set.register("material", -1);

        set.on_alloc(0);
        set.on_alloc(1);

        set.stream_mut(uv).set(1, Vector2::new(0.5, 0.25));
        set.stream_mut(mat).set(0, 3);

        assert_eq!(*set.stream(uv).get(1), Vector2::new(0.5, 0.25));
        assert_eq!(*set.stream(uv).get(0), Vector2::zeros());
        assert_eq!(*set.stream(mat).get(0), 3);
        assert_eq!(*set.stream(mat).get(1), -1);
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn test_slot_reset_on_reuse() {
        let mut set = StreamSet::new();
        let flags: StreamId<i32> = set.register("flags", 7);

        set.on_alloc(0);
        set.stream_mut(flags).set(0, 99);
        set.on_free(0);
        // Reallocation of the same index sees the default again.
        set.on_alloc(0);
        assert_eq!(*set.stream(flags).get(0), 7);
    }

    #[test]
    fn test_find_checks_type() {
        let mut set = StreamSet::new();
        let _: StreamId<i32> = set.register("material", -1);

        assert!(set.find::<i32>("material").is_some());
        assert!(set.find::<f64>("material").is_none());
        assert!(set.find::<i32>("missing").is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_name_panics() {
        let mut set = StreamSet::new();
        let _: StreamId<i32> = set.register("x", 0);
        let _: StreamId<i32> = set.register("x", 0);
    }
}
