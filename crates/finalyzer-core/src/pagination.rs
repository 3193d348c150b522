//! Paginated collection fetching.
//!
//! [`PageWindow`] holds the offset/limit/total arithmetic; [`CollectionFetcher`]
//! keeps exactly one page of a growing remote collection loaded, re-fetching
//! whenever the requested window moves.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_REFRESH: Duration = Duration::from_millis(1);

/// Slice of the collection sent to the server as `skip`/`limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// Requested slice plus the server-reported collection size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

impl PageWindow {
    /// Limit is clamped to at least one item.
    pub const fn new(offset: usize, limit: usize, total: usize) -> Self {
        let limit = if limit == 0 { 1 } else { limit };
        Self {
            offset,
            limit,
            total,
        }
    }

    pub const fn has_next(&self) -> bool {
        self.offset + self.limit < self.total
    }

    pub const fn has_prev(&self) -> bool {
        self.offset > 0
    }

    /// Advances by one page if a next page exists.
    #[must_use]
    pub const fn next(self) -> Self {
        if self.has_next() {
            Self::new(self.offset + self.limit, self.limit, self.total)
        } else {
            self
        }
    }

    /// Steps back one page, floored at offset 0.
    #[must_use]
    pub const fn prev(self) -> Self {
        Self::new(self.offset.saturating_sub(self.limit), self.limit, self.total)
    }

    /// Number of pages; an empty collection still has one (empty) page.
    pub const fn total_pages(&self) -> usize {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.limit)
        }
    }

    /// One-based index of the page containing `offset`.
    pub const fn current_page(&self) -> usize {
        self.offset / self.limit + 1
    }

    pub const fn request(&self) -> PageRequest {
        PageRequest {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// One page returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Observable state of a [`CollectionFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T> {
    pub items: Vec<T>,
    pub total: usize,
    /// Window the current `items` answer, `None` before the first success.
    pub loaded: Option<PageRequest>,
    pub last_error: Option<String>,
    pub fetches_issued: u64,
    applied_seq: u64,
}

impl<T> Default for PageState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            loaded: None,
            last_error: None,
            fetches_issued: 0,
            applied_seq: 0,
        }
    }
}

struct FetcherShared<T> {
    state: watch::Sender<PageState<T>>,
    request: watch::Sender<PageRequest>,
    cancel: CancellationToken,
}

/// Keeps one page of a remote collection loaded.
///
/// Moving the window (`next_page`, `prev_page`, `jump_to_page`) triggers a
/// fetch; a changed `total` alone never does. Pages are not cached, so going
/// back re-fetches. Failed fetches keep the last good page.
pub struct CollectionFetcher<T> {
    shared: Arc<FetcherShared<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T> CollectionFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Starts at offset 0 and immediately fetches the first page.
    ///
    /// With `refresh` set (clamped to at least 1 ms), the current page is re-fetched on that cadence
    /// without moving the window. Must be called within a Tokio runtime.
    pub fn start<F, Fut, E>(limit: usize, refresh: Option<Duration>, fetch: F) -> Self
    where
        F: Fn(PageRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let initial = PageWindow::new(0, limit, 0).request();
        let (state, _) = watch::channel(PageState::default());
        let (request, _) = watch::channel(initial);
        let shared = Arc::new(FetcherShared {
            state,
            request,
            cancel: CancellationToken::new(),
        });

        let handle = tokio::spawn(drive(Arc::clone(&shared), refresh, Arc::new(fetch)));
        Self {
            shared,
            handle: Some(handle),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> PageState<T> {
        self.shared.state.borrow().clone()
    }

    /// Currently requested window with the latest known total.
    pub fn window(&self) -> PageWindow {
        let request = *self.shared.request.borrow();
        PageWindow::new(request.offset, request.limit, self.shared.state.borrow().total)
    }

    /// Returns whether the window moved.
    pub fn next_page(&self) -> bool {
        self.move_window(PageWindow::next)
    }

    /// Returns whether the window moved.
    pub fn prev_page(&self) -> bool {
        self.move_window(PageWindow::prev)
    }

    /// Jumps to the one-based `page`, clamped to the known page range.
    pub fn jump_to_page(&self, page: usize) -> bool {
        self.move_window(|window| {
            let page = page.clamp(1, window.total_pages());
            PageWindow::new((page - 1) * window.limit, window.limit, window.total)
        })
    }

    /// Re-fetches the current window.
    pub fn refresh(&self) {
        self.shared.request.send_modify(|_| {});
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Stops the fetcher; results still in flight are never applied.
    pub fn stop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn move_window(&self, step: impl FnOnce(PageWindow) -> PageWindow) -> bool {
        if self.is_stopped() {
            return false;
        }
        let total = self.shared.state.borrow().total;
        self.shared.request.send_if_modified(|request| {
            let current = PageWindow::new(request.offset, request.limit, total);
            let moved = step(current).request();
            if moved == *request {
                false
            } else {
                *request = moved;
                true
            }
        })
    }
}

impl<T> Drop for CollectionFetcher<T> {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn drive<T, F, Fut, E>(
    shared: Arc<FetcherShared<T>>,
    refresh: Option<Duration>,
    fetch: Arc<F>,
) where
    T: Send + Sync + 'static,
    F: Fn(PageRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut requests = shared.request.subscribe();
    let mut ticker = refresh.map(|period| {
        let period = period.max(MIN_REFRESH);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut seq = 0_u64;

    let request = *requests.borrow_and_update();
    seq += 1;
    issue(&shared, &fetch, request, seq);

    loop {
        let refresh_tick = async {
            match ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
                let request = *requests.borrow_and_update();
                seq += 1;
                issue(&shared, &fetch, request, seq);
            }
            () = refresh_tick => {
                let request = *requests.borrow();
                seq += 1;
                tracing::debug!("Refreshing page at offset {}", request.offset);
                issue(&shared, &fetch, request, seq);
            }
        }
    }
}

fn issue<T, F, Fut, E>(shared: &Arc<FetcherShared<T>>, fetch: &Arc<F>, request: PageRequest, seq: u64)
where
    T: Send + Sync + 'static,
    F: Fn(PageRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    shared.state.send_modify(|state| state.fetches_issued += 1);
    let future = fetch(request);
    let shared = Arc::clone(shared);

    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return,
            result = future => result,
        };
        apply(&shared, request, seq, result);
    });
}

fn apply<T, E: Display>(
    shared: &FetcherShared<T>,
    request: PageRequest,
    seq: u64,
    result: Result<Page<T>, E>,
) {
    shared.state.send_if_modified(|state| {
        if shared.cancel.is_cancelled() {
            return false;
        }
        if *shared.request.borrow() != request || seq <= state.applied_seq {
            tracing::debug!(
                "Discarding stale page result for offset {} (seq {})",
                request.offset,
                seq
            );
            return false;
        }
        match result {
            Ok(page) => {
                state.items = page.items;
                state.total = page.total;
                state.loaded = Some(request);
                state.last_error = None;
                state.applied_seq = seq;
            }
            Err(error) => {
                tracing::warn!("Failed to fetch page at offset {}: {}", request.offset, error);
                state.last_error = Some(error.to_string());
            }
        }
        true
    });
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        requests: Arc<Mutex<Vec<PageRequest>>>,
        total: Arc<Mutex<usize>>,
    }

    impl Recorder {
        fn with_total(total: usize) -> Self {
            let recorder = Self::default();
            *recorder.total.lock().unwrap() = total;
            recorder
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn fetcher(&self, limit: usize, refresh: Option<Duration>) -> CollectionFetcher<usize> {
            let recorder = self.clone();
            CollectionFetcher::start(limit, refresh, move |request: PageRequest| {
                recorder.requests.lock().unwrap().push(request);
                let total = *recorder.total.lock().unwrap();
                async move {
                    let end = (request.offset + request.limit).min(total);
                    Ok::<_, String>(Page {
                        items: (request.offset..end).collect(),
                        total,
                    })
                }
            })
        }
    }

    fn request(offset: usize, limit: usize) -> PageRequest {
        PageRequest { offset, limit }
    }

    #[test]
    fn next_walks_pages_until_total() {
        let window = PageWindow::new(0, 5, 12);
        let second = window.next();
        let third = second.next();
        assert_eq!(second.offset, 5);
        assert_eq!(third.offset, 10);
        assert!(!third.has_next());
        assert_eq!(third.next().offset, 10);
        assert_eq!(window.total_pages(), 3);
        assert_eq!(third.current_page(), 3);
    }

    #[test]
    fn exact_multiple_has_no_trailing_page() {
        let window = PageWindow::new(5, 5, 10);
        assert!(!window.has_next());
        assert_eq!(window.total_pages(), 2);
    }

    #[test]
    fn prev_floors_at_zero() {
        assert_eq!(PageWindow::new(3, 5, 12).prev().offset, 0);
        assert_eq!(PageWindow::new(0, 5, 12).prev().offset, 0);
        assert_eq!(PageWindow::new(10, 5, 12).prev().offset, 5);
    }

    #[test]
    fn empty_collection_reports_one_page() {
        let window = PageWindow::new(0, 5, 0);
        assert_eq!(window.total_pages(), 1);
        assert_eq!(window.next(), window);
        assert_eq!(window.prev(), window);
        assert!(!window.has_next());
        assert!(!window.has_prev());
    }

    #[test]
    fn zero_limit_is_clamped() {
        let window = PageWindow::new(0, 0, 3);
        assert_eq!(window.limit, 1);
        assert_eq!(window.total_pages(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn mount_fetches_first_page_once() {
        let recorder = Recorder::with_total(12);
        let fetcher = recorder.fetcher(5, None);
        settle().await;

        assert_eq!(recorder.requests(), vec![request(0, 5)]);
        let state = fetcher.snapshot();
        assert_eq!(state.items, vec![0, 1, 2, 3, 4]);
        assert_eq!(state.total, 12);
        assert_eq!(state.loaded, Some(request(0, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_refetches_without_caching() {
        let recorder = Recorder::with_total(12);
        let fetcher = recorder.fetcher(5, None);
        settle().await;

        assert!(fetcher.next_page());
        settle().await;
        assert!(fetcher.next_page());
        settle().await;
        assert!(!fetcher.next_page());
        settle().await;
        assert_eq!(fetcher.snapshot().items, vec![10, 11]);

        assert!(fetcher.prev_page());
        settle().await;
        assert_eq!(
            recorder.requests(),
            vec![request(0, 5), request(5, 5), request(10, 5), request(5, 5)]
        );
        assert_eq!(fetcher.window().current_page(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_collection_navigation_is_noop() {
        let recorder = Recorder::with_total(0);
        let fetcher = recorder.fetcher(5, None);
        settle().await;

        assert!(!fetcher.next_page());
        assert!(!fetcher.prev_page());
        settle().await;
        assert_eq!(recorder.requests(), vec![request(0, 5)]);
        assert_eq!(fetcher.window().total_pages(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn total_change_alone_does_not_refetch() {
        let recorder = Recorder::with_total(3);
        let fetcher = recorder.fetcher(5, None);
        settle().await;

        *recorder.total.lock().unwrap() = 9;
        fetcher.shared.state.send_modify(|state| state.total = 9);
        settle().await;
        assert_eq!(recorder.requests().len(), 1);

        assert!(fetcher.next_page());
        settle().await;
        assert_eq!(recorder.requests(), vec![request(0, 5), request(5, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_refetches_current_window() {
        let recorder = Recorder::with_total(12);
        let fetcher = recorder.fetcher(5, Some(Duration::from_secs(5)));
        settle().await;
        assert_eq!(recorder.requests().len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(recorder.requests(), vec![request(0, 5), request(0, 5)]);

        fetcher.refresh();
        settle().await;
        assert_eq!(recorder.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_refresh_period_is_clamped() {
        let recorder = Recorder::with_total(3);
        let fetcher = recorder.fetcher(5, Some(Duration::ZERO));
        settle().await;
        assert_eq!(fetcher.snapshot().loaded, Some(request(0, 5)));
        assert_eq!(fetcher.snapshot().items, vec![0, 1, 2]);

        tokio::time::advance(MIN_REFRESH).await;
        settle().await;
        assert_eq!(recorder.requests(), vec![request(0, 5), request(0, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn jump_to_page_clamps_to_known_range() {
        let recorder = Recorder::with_total(12);
        let fetcher = recorder.fetcher(5, None);
        settle().await;

        assert!(fetcher.jump_to_page(9));
        settle().await;
        assert_eq!(fetcher.window().offset, 10);
        assert!(!fetcher.jump_to_page(3));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_page_result_is_discarded() {
        let pending: Arc<Mutex<VecDeque<oneshot::Sender<Page<usize>>>>> = Arc::default();
        let queue = Arc::clone(&pending);
        let fetcher = CollectionFetcher::start(5, None, move |_request: PageRequest| {
            let (tx, rx) = oneshot::channel();
            queue.lock().unwrap().push_back(tx);
            async move { rx.await.map_err(|error| error.to_string()) }
        });
        settle().await;

        // First page never answered before moving on.
        let first = pending.lock().unwrap().pop_front().unwrap();
        fetcher.shared.state.send_modify(|state| state.total = 12);
        assert!(fetcher.next_page());
        settle().await;
        let second = pending.lock().unwrap().pop_front().unwrap();

        let _ = second.send(Page {
            items: vec![5, 6, 7, 8, 9],
            total: 12,
        });
        settle().await;
        let _ = first.send(Page {
            items: vec![0, 1, 2, 3, 4],
            total: 12,
        });
        settle().await;

        let state = fetcher.snapshot();
        assert_eq!(state.items, vec![5, 6, 7, 8, 9]);
        assert_eq!(state.loaded, Some(request(5, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_last_good_page() {
        let fail = Arc::new(Mutex::new(false));
        let toggle = Arc::clone(&fail);
        let fetcher = CollectionFetcher::start(5, None, move |request: PageRequest| {
            let should_fail = *toggle.lock().unwrap();
            async move {
                if should_fail {
                    Err("connection reset".to_string())
                } else {
                    Ok(Page {
                        items: vec![request.offset],
                        total: 1,
                    })
                }
            }
        });
        settle().await;

        *fail.lock().unwrap() = true;
        fetcher.refresh();
        settle().await;

        let state = fetcher.snapshot();
        assert_eq!(state.items, vec![0]);
        assert_eq!(state.last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_fetcher_ignores_in_flight_results() {
        let pending: Arc<Mutex<Vec<oneshot::Sender<Page<usize>>>>> = Arc::default();
        let queue = Arc::clone(&pending);
        let mut fetcher = CollectionFetcher::start(5, None, move |_request: PageRequest| {
            let (tx, rx) = oneshot::channel();
            queue.lock().unwrap().push(tx);
            async move { rx.await.map_err(|error| error.to_string()) }
        });
        settle().await;

        fetcher.stop();
        let sender = pending.lock().unwrap().pop().unwrap();
        let _ = sender.send(Page {
            items: vec![1],
            total: 1,
        });
        settle().await;

        let state = fetcher.snapshot();
        assert!(state.items.is_empty());
        assert_eq!(state.loaded, None);
        assert!(fetcher.is_stopped());
        assert!(!fetcher.next_page());
    }
}
