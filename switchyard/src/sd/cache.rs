use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::time::Instant;

use crate::{BoxEndpoint, Error};

use super::{Closer, Event, Factory, Instance};

/// A snapshot of live endpoints, ordered by instance.
pub type Endpoints<Req, Resp> = Arc<Vec<BoxEndpoint<Req, Resp>>>;

/// Settings for an [`EndpointCache`] and the endpointers built on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointerOptions {
    invalidate_on_error: Option<Duration>,
}

impl EndpointerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// After service discovery has been failing for `timeout`, drop every
    /// endpoint and return the discovery error instead. By default the last
    /// known endpoints are kept for as long as discovery fails.
    pub fn invalidate_on_error(mut self, timeout: Duration) -> Self {
        self.invalidate_on_error = Some(timeout);
        self
    }
}

struct Live<Req, Resp> {
    endpoint: BoxEndpoint<Req, Resp>,
    closer: Closer,
}

type LiveSet<Req, Resp> = BTreeMap<Instance, Live<Req, Resp>>;

struct CacheState<Req, Resp> {
    live: LiveSet<Req, Resp>,
    /// Ticket handed to the most recent replace.
    issued: u64,
    /// Ticket of the replace whose endpoints are live.
    committed: u64,
    closed: bool,
}

struct Failure {
    error: Arc<Error>,
    deadline: Instant,
}

/// Live endpoints for a changing set of instances.
///
/// Replaces are ordered by arrival: the last call to arrive determines the
/// final state, even when an earlier one finishes building later. The lock
/// only guards bookkeeping; the factory and closers run outside it, and
/// readers never take it.
pub struct EndpointCache<Req, Resp> {
    factory: Box<dyn Factory<Req, Resp>>,
    options: EndpointerOptions,
    state: Mutex<CacheState<Req, Resp>>,
    published: ArcSwap<Vec<BoxEndpoint<Req, Resp>>>,
    failure: ArcSwapOption<Failure>,
}

impl<Req, Resp> EndpointCache<Req, Resp> {
    pub fn new(factory: impl Factory<Req, Resp> + 'static, options: EndpointerOptions) -> Self {
        Self {
            factory: Box::new(factory),
            options,
            state: Mutex::new(CacheState {
                live: BTreeMap::new(),
                issued: 0,
                committed: 0,
                closed: false,
            }),
            published: ArcSwap::from_pointee(Vec::new()),
            failure: ArcSwapOption::empty(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<Req, Resp>> {
        self.state
            .lock()
            .expect("local mutex should not be poisoned")
    }

    /// Make the cache hold exactly `instances`.
    ///
    /// Instances already present keep their endpoint. New instances get one
    /// from the factory; factory failures are logged and the instance is left
    /// out. The new endpoint list is published before the closers of removed
    /// instances run, each exactly once.
    pub fn replace(&self, instances: &[Instance]) {
        let mut instances = instances.to_vec();
        instances.sort();
        instances.dedup();

        let ticket = {
            let mut state = self.lock();
            if state.closed {
                log::debug!("endpoint cache is closed, ignoring replace");
                return;
            }
            state.issued += 1;
            state.issued
        };

        let mut built = LiveSet::new();
        let mut failed = HashSet::new();
        loop {
            let mut state = self.lock();
            if state.closed || ticket < state.committed {
                drop(state);
                log::debug!("replace {ticket} was superseded");
                close_all(built);
                return;
            }
            // A replace committed since the last look may have removed
            // instances this one means to keep.
            let missing: Vec<Instance> = instances
                .iter()
                .filter(|instance| {
                    !state.live.contains_key(*instance)
                        && !built.contains_key(*instance)
                        && !failed.contains(*instance)
                })
                .cloned()
                .collect();
            if missing.is_empty() {
                let leftovers = self.commit(&mut state, ticket, &instances, &mut built);
                drop(state);
                close_all(leftovers);
                close_all(built);
                return;
            }
            drop(state);

            for instance in missing {
                match self.factory.build(&instance) {
                    Ok((endpoint, closer)) => {
                        built.insert(instance, Live { endpoint, closer });
                    }
                    Err(e) => {
                        log::warn!("could not build endpoint for instance {instance:?}: {e}");
                        failed.insert(instance);
                    }
                }
            }
        }
    }

    /// Swap in the endpoints for `instances`, taken from the live set or from
    /// `built`, and publish them. Returns what is no longer live.
    fn commit(
        &self,
        state: &mut CacheState<Req, Resp>,
        ticket: u64,
        instances: &[Instance],
        built: &mut LiveSet<Req, Resp>,
    ) -> LiveSet<Req, Resp> {
        let mut previous = std::mem::take(&mut state.live);
        for instance in instances {
            if let Some(live) = previous.remove(instance).or_else(|| built.remove(instance)) {
                state.live.insert(instance.clone(), live);
            }
        }
        state.committed = ticket;
        self.published.store(Arc::new(
            state.live.values().map(|live| live.endpoint.clone()).collect(),
        ));
        previous
    }

    /// Publish an empty endpoint list under the lock the caller holds.
    fn clear(&self, state: &mut CacheState<Req, Resp>) -> LiveSet<Req, Resp> {
        state.issued += 1;
        let ticket = state.issued;
        self.commit(state, ticket, &[], &mut LiveSet::new())
    }

    /// Apply a publisher event.
    pub fn update(&self, event: Event) {
        match event.error {
            None => {
                self.failure.store(None);
                self.replace(&event.instances);
            }
            Some(error) => {
                log::warn!("service discovery error: {error}");
                let Some(timeout) = self.options.invalidate_on_error else {
                    return;
                };
                let state = self.lock();
                if state.closed {
                    log::debug!("endpoint cache is closed, ignoring update");
                    return;
                }
                if self.failure.load().is_none() {
                    self.failure.store(Some(Arc::new(Failure {
                        error,
                        deadline: Instant::now() + timeout,
                    })));
                }
            }
        }
    }

    /// The current endpoints, or the discovery error once invalidation kicked in.
    pub fn endpoints(&self) -> Result<Endpoints<Req, Resp>, Error> {
        if let Some(failure) = &*self.failure.load() {
            if failure.deadline <= Instant::now() {
                self.invalidate(&failure.error);
                return Err(Error::Discovery(failure.error.clone()));
            }
        }
        Ok(self.published.load_full())
    }

    /// Drop the live endpoints if nobody else holds the lock. Otherwise the
    /// next reader tries again.
    fn invalidate(&self, error: &Error) {
        let Ok(mut state) = self.state.try_lock() else {
            return;
        };
        if state.live.is_empty() {
            return;
        }
        log::warn!("invalidating endpoints after discovery error: {error}");
        let leftovers = self.clear(&mut state);
        drop(state);
        close_all(leftovers);
    }

    /// Close every endpoint. Later updates are ignored.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let leftovers = self.clear(&mut state);
        drop(state);
        close_all(leftovers);
    }
}

fn close_all<Req, Resp>(leftovers: LiveSet<Req, Resp>) {
    for (instance, leftover) in leftovers {
        log::debug!("closing endpoint for instance {instance:?}");
        leftover.closer.close();
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use crossbeam_channel::{bounded, Receiver, Sender};

    use crate::{
        endpoint::nop,
        sd::{Closer, EndpointCache, EndpointerOptions, Event},
        BoxEndpoint, Error,
    };

    /// Counts how many times each instance's closer ran.
    #[derive(Default, Clone)]
    struct Closes(Arc<std::sync::Mutex<HashMap<String, usize>>>);

    impl Closes {
        fn of(&self, instance: &str) -> usize {
            self.0
                .lock()
                .expect("local mutex should not be poisoned")
                .get(instance)
                .copied()
                .unwrap_or(0)
        }
    }

    fn factory(
        closes: Closes,
        known: &'static [&'static str],
        builds: Arc<AtomicUsize>,
    ) -> impl Fn(&str) -> Result<(BoxEndpoint<(), ()>, Closer), Error> + Send + Sync {
        move |instance: &str| {
            if !known.iter().any(|known| *known == instance) {
                return Err(Error::from(format!("unknown instance {instance:?}")));
            }
            builds.fetch_add(1, Ordering::Relaxed);
            let closes = closes.clone();
            let instance = instance.to_string();
            Ok((
                nop(),
                Closer::new(move || {
                    *closes
                        .0
                        .lock()
                        .expect("local mutex should not be poisoned")
                        .entry(instance)
                        .or_default() += 1;
                }),
            ))
        }
    }

    /// Builds of "slow" announce themselves on `started`, then wait for `release`.
    fn gated_factory(
        closes: Closes,
        started: Sender<()>,
        release: Receiver<()>,
    ) -> impl Fn(&str) -> Result<(BoxEndpoint<(), ()>, Closer), Error> + Send + Sync {
        let inner = factory(closes, &["a", "b", "slow"], Default::default());
        move |instance: &str| {
            if instance == "slow" {
                started.send(()).expect("test is waiting for the build");
                release.recv().expect("test releases the build");
            }
            inner(instance)
        }
    }

    fn instances(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test_log::test]
    fn lifecycle() {
        let closes = Closes::default();
        let builds = Arc::new(AtomicUsize::new(0));
        let cache = EndpointCache::new(
            factory(closes.clone(), &["a", "b"], builds.clone()),
            EndpointerOptions::new(),
        );

        cache.replace(&instances(&["a", "b"]));
        cache.replace(&instances(&["b", "a"]));
        assert_eq!(0, closes.of("a"));
        assert_eq!(0, closes.of("b"));
        assert_eq!(2, builds.load(Ordering::Relaxed));
        assert_eq!(2, cache.endpoints().expect("no errors").len());

        cache.replace(&instances(&["a"]));
        assert_eq!(0, closes.of("a"));
        assert_eq!(1, closes.of("b"));
        assert_eq!(1, cache.endpoints().expect("no errors").len());

        cache.replace(&instances(&[""]));
        assert_eq!(1, closes.of("a"));
        assert_eq!(1, closes.of("b"));
        assert!(cache.endpoints().expect("no errors").is_empty());
    }

    #[test_log::test]
    fn eviction_closes_each_removed_instance_once() {
        let closes = Closes::default();
        let cache = EndpointCache::new(
            factory(closes.clone(), &["a", "b", "c"], Default::default()),
            EndpointerOptions::new(),
        );

        cache.replace(&instances(&["a", "b", "c"]));
        cache.replace(&instances(&["a"]));
        cache.replace(&instances(&["a"]));
        assert_eq!(0, closes.of("a"));
        assert_eq!(1, closes.of("b"));
        assert_eq!(1, closes.of("c"));
    }

    #[test_log::test]
    fn duplicates_and_factory_failures() {
        let closes = Closes::default();
        let builds = Arc::new(AtomicUsize::new(0));
        let cache = EndpointCache::new(
            factory(closes.clone(), &["a"], builds.clone()),
            EndpointerOptions::new(),
        );

        cache.replace(&instances(&["a", "a", "broken"]));
        assert_eq!(1, builds.load(Ordering::Relaxed));
        assert_eq!(1, cache.endpoints().expect("no errors").len());

        cache.close();
        assert_eq!(1, closes.of("a"));
        cache.replace(&instances(&["a"]));
        assert!(cache.endpoints().expect("no errors").is_empty());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn errors_keep_endpoints_until_invalidated() {
        let closes = Closes::default();
        let cache = EndpointCache::new(
            factory(closes.clone(), &["a"], Default::default()),
            EndpointerOptions::new().invalidate_on_error(Duration::from_secs(5)),
        );
        cache.update(Event::instances(["a"]));

        cache.update(Event::error(Error::from("registry unreachable")));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(1, cache.endpoints().expect("still within timeout").len());

        // a second error does not push the deadline out
        cache.update(Event::error(Error::from("still unreachable")));
        tokio::time::advance(Duration::from_secs(1)).await;
        let error = cache.endpoints().err().expect("invalidated");
        assert!(error.to_string().contains("registry unreachable"));
        assert_eq!(1, closes.of("a"));

        cache.update(Event::instances(["a"]));
        assert_eq!(1, cache.endpoints().expect("recovered").len());
    }

    #[test_log::test]
    fn errors_are_ignored_without_invalidation() {
        let cache = EndpointCache::new(
            factory(Closes::default(), &["a"], Default::default()),
            EndpointerOptions::new(),
        );
        cache.update(Event::instances(["a"]));
        cache.update(Event::error(Error::from("registry unreachable")));
        assert_eq!(1, cache.endpoints().expect("errors are ignored").len());
    }

    #[test_log::test]
    fn the_last_replace_to_arrive_wins() {
        let closes = Closes::default();
        let (started_sender, started) = bounded(0);
        let (release, release_receiver) = bounded(0);
        let cache = Arc::new(EndpointCache::new(
            gated_factory(closes.clone(), started_sender, release_receiver),
            EndpointerOptions::new(),
        ));

        let slow = thread::spawn({
            let cache = cache.clone();
            move || cache.replace(&instances(&["slow"]))
        });
        started.recv().expect("slow build starts");

        cache.replace(&instances(&["a", "b"]));
        assert_eq!(2, cache.endpoints().expect("no errors").len());

        release.send(()).expect("slow build is waiting");
        slow.join().expect("replace does not panic");

        assert_eq!(2, cache.endpoints().expect("no errors").len());
        assert_eq!(1, closes.of("slow"));
        assert_eq!(0, closes.of("a"));
        assert_eq!(0, closes.of("b"));
    }

    #[test_log::test]
    fn readers_do_not_wait_for_the_factory() {
        let closes = Closes::default();
        let (started_sender, started) = bounded(0);
        let (release, release_receiver) = bounded(0);
        let cache = Arc::new(EndpointCache::new(
            gated_factory(closes.clone(), started_sender, release_receiver),
            EndpointerOptions::new().invalidate_on_error(Duration::ZERO),
        ));
        cache.update(Event::instances(["a"]));

        let slow = thread::spawn({
            let cache = cache.clone();
            move || cache.replace(&instances(&["a", "slow"]))
        });
        started.recv().expect("slow build starts");

        // Both return while "slow" is still being built.
        cache.update(Event::error(Error::from("registry unreachable")));
        let error = cache.endpoints().err().expect("invalidated at once");
        assert!(matches!(error, Error::Discovery(_)), "{error}");
        assert_eq!(1, closes.of("a"));

        release.send(()).expect("slow build is waiting");
        slow.join().expect("replace does not panic");

        // Invalidation arrived after the slow replace, so it stands.
        assert!(cache.endpoints().is_err());
        assert_eq!(1, closes.of("slow"));
    }
}
