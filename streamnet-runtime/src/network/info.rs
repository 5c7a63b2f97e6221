//! Construction info and the placement hook

use crate::config::RuntimeConfig;
use crate::stream::Stream;
use std::fmt;
use std::sync::Arc;
use streamnet_types::LocationVector;

/// Placement location of an entity
pub type Location = i32;

/// Placement hook consulted by every creation function
///
/// `route_update` is called on each stream right after a routing decision;
/// the returned stream is what the caller uses locally.
pub trait Router: Send + Sync {
    fn route_update(&self, info: &Info, stream: Stream, location: Location) -> Stream;

    /// Whether entities placed at `location` are created in this process
    fn is_local(&self, _location: Location) -> bool {
        true
    }
}

/// Router keeping everything in process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRouter;

impl Router for LocalRouter {
    fn route_update(&self, _info: &Info, stream: Stream, _location: Location) -> Stream {
        stream
    }
}

/// State threaded through network construction
#[derive(Clone)]
pub struct Info {
    /// Structural address of the entity being built
    pub locvec: LocationVector,
    /// Placement location of the entity being built
    pub location: Location,
    router: Arc<dyn Router>,
    config: Arc<RuntimeConfig>,
}

impl Info {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self {
            locvec: LocationVector::new(),
            location: 0,
            router: Arc::new(LocalRouter),
            config,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = router;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A fresh stream with the configured capacity
    pub fn create_stream(&self) -> Stream {
        Stream::with_capacity(self.config.stream.capacity)
    }

    pub fn route_update(&self, stream: Stream, location: Location) -> Stream {
        self.router.route_update(self, stream, location)
    }

    /// Whether the entity under construction lives in this process
    pub fn is_local(&self) -> bool {
        self.router.is_local(self.location)
    }
}

impl Default for Info {
    fn default() -> Self {
        Self::new(Arc::new(RuntimeConfig::default()))
    }
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("locvec", &self.locvec.to_string())
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    #[test]
    fn test_streams_follow_configured_capacity() {
        let info = Info::default();
        assert_eq!(info.create_stream().capacity(), None);

        let config = RuntimeConfig {
            stream: StreamConfig { capacity: Some(4) },
            ..Default::default()
        };
        let info = Info::new(Arc::new(config));
        assert_eq!(info.create_stream().capacity(), Some(4));
    }

    struct Remote;

    impl Router for Remote {
        fn route_update(&self, _info: &Info, _stream: Stream, _location: Location) -> Stream {
            Stream::new()
        }

        fn is_local(&self, location: Location) -> bool {
            location == 0
        }
    }

    #[test]
    fn test_router_hook() {
        let mut info = Info::default().with_router(Arc::new(Remote));
        let stream = Stream::new();
        assert!(!info.route_update(stream.clone(), 1).same_stream(&stream));
        assert!(info.is_local());
        info.location = 3;
        assert!(!info.is_local());

        let local = Info::default();
        assert!(local.route_update(stream.clone(), 1).same_stream(&stream));
    }
}
