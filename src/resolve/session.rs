//! Schedule import session: orchestrates resolver calls across pagination
//! pages and query modes, owns the shared-state lock, and exposes
//! completion callbacks.
//!
//! Completion callbacks from the query engine run on arbitrary worker
//! threads. Each acquires the single per-session mutex for its table
//! mutation, enqueues follow-up fetches while still holding it (enqueueing
//! never blocks), and collects notifications that are delivered to
//! observers only after the lock is released.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::{AnimatedEntity, Generation, Schedule};
use crate::stats::ImportStats;
use crate::timeline::{add_binding_keyframes, TimelineKey, TimelineSet};
use crate::util::{BBox3d, BindingIdx, ElementId, Error, Result, TimePoint};

use super::protocol::{
    BindingsFilter, Page, Request, ScheduleItem, ELEMENT_BATCH_MAX,
};
use super::queue::{Document, QueryClient};
use super::resolver::{self, TransformFetch, TransformRoute};

/// Identity of the remote model a session synchronizes against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub itwin_id: String,
    pub model_id: String,
    pub changeset_id: String,
}

/// Generation-detection state machine: `Unknown -> {Legacy, NextGen}`.
///
/// The first non-empty schedule list wins. Falling back from Legacy to
/// NextGen happens at most once per connection; switching back requires a
/// full reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GenerationState {
    Unknown,
    Detected(Generation),
}

/// Completion callback of one public query operation; receives overall
/// success once every fetch the operation spawned has finished.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// A binding became fully resolved and its keyframes were written.
#[derive(Clone, Debug)]
pub struct BindingNotice {
    pub schedule_id: String,
    pub binding: BindingIdx,
    pub timeline: TimelineKey,
}

/// A group gained a member.
#[derive(Clone, Debug)]
pub struct GroupNotice {
    pub schedule_id: String,
    pub group_id: String,
}

pub type OnBindingAdded = Box<dyn Fn(&BindingNotice) + Send + Sync>;
pub type OnGroupModified = Box<dyn Fn(&GroupNotice) + Send + Sync>;

#[derive(Default)]
struct Observers {
    on_binding_added: Option<OnBindingAdded>,
    on_group_modified: Option<OnGroupModified>,
}

/// Outstanding-work counter of one public operation.
///
/// The operation holds one unit itself (the sentinel); every spawned fetch
/// adds one. The final decrement, wherever it happens, fires the
/// completion callback exactly once.
struct WorkBatch {
    remaining: AtomicUsize,
    failed: AtomicBool,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl WorkBatch {
    fn new(on_complete: CompletionCallback) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(1),
            failed: AtomicBool::new(false),
            on_complete: Mutex::new(Some(on_complete)),
        })
    }

    fn add_unit(&self) {
        self.remaining.fetch_add(1, Ordering::SeqCst);
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    fn complete_unit(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(cb) = self.on_complete.lock().take() {
                cb(!self.failed.load(Ordering::SeqCst));
            }
        }
    }
}

/// Work deferred until after the state lock is released: observer
/// notifications and batch units whose completion may run user code.
#[derive(Default)]
struct Post {
    bindings: Vec<BindingNotice>,
    groups: Vec<GroupNotice>,
    units: Vec<Arc<WorkBatch>>,
}

/// An operation waiting for the schedule list to load.
struct PendingAction {
    batch: Arc<WorkBatch>,
    action: ScheduleAction,
}

type ScheduleAction = Box<dyn FnOnce(&Arc<SessionShared>, &mut SessionState, &mut Post) + Send>;

enum ScheduleLoad {
    NotStarted,
    InFlight(Vec<PendingAction>),
    Done,
}

/// Page-level counters.
#[derive(Debug, Default, Clone, Copy)]
struct PageCounters {
    pages_fetched: usize,
    items_parsed: usize,
    items_skipped: usize,
}

struct SessionState {
    connection: Option<ConnectionInfo>,
    generation: GenerationState,
    fallback_used: bool,
    schedule_load: ScheduleLoad,
    schedules: Vec<Schedule>,
    timelines: TimelineSet,
    counters: PageCounters,
}

impl SessionState {
    fn fresh(connection: Option<ConnectionInfo>) -> Self {
        Self {
            connection,
            generation: GenerationState::Unknown,
            fallback_used: false,
            schedule_load: ScheduleLoad::NotStarted,
            schedules: Vec::new(),
            timelines: TimelineSet::new(),
            counters: PageCounters::default(),
        }
    }

    fn schedule_pos(&self, id: &str) -> Option<usize> {
        self.schedules.iter().position(|s| s.id == id)
    }

    /// Write keyframes for freshly resolved bindings and queue their
    /// notices.
    fn build_timelines(&mut self, pos: usize, newly: &[BindingIdx], post: &mut Post) {
        let Self {
            schedules,
            timelines,
            ..
        } = self;
        let schedule = &schedules[pos];
        for &binding in newly {
            add_binding_keyframes(timelines, schedule, binding);
            let key = match &schedule.binding(binding).key.entity {
                AnimatedEntity::Element(e) => TimelineKey::Element(*e),
                AnimatedEntity::Group(g) => TimelineKey::Group(schedule.groups.get(*g).id.clone()),
            };
            post.bindings.push(BindingNotice {
                schedule_id: schedule.id.clone(),
                binding,
                timeline: key,
            });
        }
    }
}

struct SessionShared {
    client: Arc<dyn QueryClient>,
    state: Mutex<SessionState>,
    observers: Mutex<Observers>,
    /// Bumped by every reset; in-flight callbacks from an older epoch do
    /// nothing.
    epoch: AtomicU64,
}

impl SessionShared {
    /// Deliver deferred notifications and batch completions. Must be
    /// called without the state lock held.
    fn finish(&self, post: Post) {
        if !post.bindings.is_empty() || !post.groups.is_empty() {
            let observers = self.observers.lock();
            if let Some(cb) = &observers.on_binding_added {
                for notice in &post.bindings {
                    cb(notice);
                }
            }
            if let Some(cb) = &observers.on_group_modified {
                for notice in &post.groups {
                    cb(notice);
                }
            }
        }
        for batch in post.units {
            batch.complete_unit();
        }
    }
}

/// The schedule import session.
///
/// Created over a query client; connect with [`reset_connection`]
/// (ImportSession::reset_connection) before querying.
pub struct ImportSession {
    shared: Arc<SessionShared>,
}

impl ImportSession {
    pub fn new(client: Arc<dyn QueryClient>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                client,
                state: Mutex::new(SessionState::fresh(None)),
                observers: Mutex::new(Observers::default()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Point the session at a remote model.
    ///
    /// In-flight callbacks are invalidated. Resetting to the same
    /// (iTwin, model, changeset) triple preserves already-resolved tables
    /// and clears only the progress flags; a different triple starts
    /// fresh, with generation detection back at Unknown.
    pub fn reset_connection(
        &self,
        itwin_id: impl Into<String>,
        model_id: impl Into<String>,
        changeset_id: impl Into<String>,
    ) {
        let info = ConnectionInfo {
            itwin_id: itwin_id.into(),
            model_id: model_id.into(),
            changeset_id: changeset_id.into(),
        };
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let mut post = Post::default();
        {
            let mut state = self.shared.state.lock();
            let same = state.connection.as_ref() == Some(&info);
            if same {
                for schedule in &mut state.schedules {
                    schedule.clear_queried_elements();
                }
                // A load interrupted mid-flight never finishes (its
                // callbacks are stale now); its waiters fail and the next
                // operation re-fetches the schedule list.
                match std::mem::replace(&mut state.schedule_load, ScheduleLoad::NotStarted) {
                    ScheduleLoad::Done if !state.schedules.is_empty() => {
                        state.schedule_load = ScheduleLoad::Done;
                    }
                    ScheduleLoad::InFlight(pending) => {
                        for p in pending {
                            p.batch.fail();
                            post.units.push(p.batch);
                        }
                    }
                    _ => {}
                }
            } else {
                let old = std::mem::replace(&mut *state, SessionState::fresh(Some(info)));
                if let ScheduleLoad::InFlight(pending) = old.schedule_load {
                    for p in pending {
                        p.batch.fail();
                        post.units.push(p.batch);
                    }
                }
            }
        }
        self.shared.finish(post);
    }

    /// Whether a connection target has been set.
    pub fn is_ready_to_query(&self) -> bool {
        self.shared.state.lock().connection.is_some()
    }

    /// Install (or clear) the resolver observers.
    pub fn set_observers(
        &self,
        on_binding_added: Option<OnBindingAdded>,
        on_group_modified: Option<OnGroupModified>,
    ) {
        let mut observers = self.shared.observers.lock();
        observers.on_binding_added = on_binding_added;
        observers.on_group_modified = on_group_modified;
    }

    /// Query all bindings of every schedule, optionally restricted to a
    /// time window.
    pub fn query_entire_schedule(
        &self,
        from_time: Option<TimePoint>,
        until_time: Option<TimePoint>,
        on_complete: CompletionCallback,
    ) {
        let filter = BindingsFilter::time_window(from_time, until_time);
        Self::query_all_schedules(&self.shared, filter, on_complete);
    }

    /// Query one element's bindings, then widen to the time window around
    /// its existing timeline extent.
    ///
    /// The widened query is skipped when the element ends up with no
    /// timeline at all.
    pub fn query_around_element_tasks(
        &self,
        element: ElementId,
        margin_before: f64,
        margin_after: f64,
        on_complete: CompletionCallback,
    ) {
        let shared = Arc::clone(&self.shared);
        let chained: CompletionCallback = Box::new(move |success| {
            let extent = shared.state.lock().timelines.element_extent(element);
            match extent {
                Some(range) => {
                    let filter = BindingsFilter::time_window(
                        Some(range.start - margin_before),
                        Some(range.end + margin_after),
                    );
                    Self::query_all_schedules(&shared, filter, on_complete);
                    if !success {
                        debug!("element query reported failure; widened query still issued");
                    }
                }
                None => on_complete(success),
            }
        });

        let filter = BindingsFilter::default();
        Self::query_selected_elements(&self.shared, vec![element], filter, false, chained);
    }

    /// Query bindings for a set of elements, optionally restricted to a
    /// time window.
    ///
    /// Elements a binding query was already issued for are skipped. An
    /// empty set completes immediately, successfully, with zero fetches.
    pub fn query_elements_tasks(
        &self,
        elements: &[ElementId],
        from_time: Option<TimePoint>,
        until_time: Option<TimePoint>,
        on_complete: CompletionCallback,
    ) {
        let filter = BindingsFilter::time_window(from_time, until_time);
        Self::query_selected_elements(&self.shared, elements.to_vec(), filter, true, on_complete);
    }

    /// Snapshot of the import counters.
    pub fn stats(&self) -> ImportStats {
        let state = self.shared.state.lock();
        let mut stats = ImportStats {
            schedules: state.schedules.len(),
            timelines: state.timelines.len(),
            pages_fetched: state.counters.pages_fetched,
            items_parsed: state.counters.items_parsed,
            items_skipped: state.counters.items_skipped,
            ..Default::default()
        };
        for s in &state.schedules {
            stats.tasks += s.tasks.len();
            stats.profiles += s.profiles.len();
            stats.transforms += s.transforms.len();
            stats.paths += s.paths.len();
            stats.groups += s.groups.len();
            stats.bindings += s.binding_count();
            stats.notified_bindings += s.notified_binding_count();
        }
        stats
    }

    /// Total number of tasks across schedules.
    pub fn task_count(&self) -> usize {
        self.stats().tasks
    }

    /// Human-readable import summary.
    pub fn summary(&self) -> String {
        self.stats().to_string()
    }

    /// Read access to the timeline store.
    pub fn with_timelines<R>(&self, f: impl FnOnce(&TimelineSet) -> R) -> R {
        f(&self.shared.state.lock().timelines)
    }

    /// Read access to the synchronized schedules.
    pub fn with_schedules<R>(&self, f: impl FnOnce(&[Schedule]) -> R) -> R {
        f(&self.shared.state.lock().schedules)
    }

    /// Resolve one entity's deferred timeline values against its
    /// bounding box. Idempotent; runs outside the per-frame path.
    pub fn finalize_entity_geometry(&self, key: &TimelineKey, bbox: &BBox3d) {
        self.shared
            .state
            .lock()
            .timelines
            .finalize_geometry(key, bbox);
    }

    // ------------------------------------------------------------------
    // Internal orchestration
    // ------------------------------------------------------------------

    /// Issue an unfiltered-by-element bindings query for every schedule.
    fn query_all_schedules(
        shared: &Arc<SessionShared>,
        filter: BindingsFilter,
        on_complete: CompletionCallback,
    ) {
        let batch = WorkBatch::new(on_complete);
        let mut post = Post::default();
        {
            let mut state = shared.state.lock();
            if state.connection.is_none() {
                warn!("query before reset_connection");
                batch.fail();
            } else {
                let batch2 = Arc::clone(&batch);
                ensure_schedules(
                    shared,
                    &mut state,
                    &batch,
                    &mut post,
                    Box::new(move |shared, state, _post| {
                        let filter = Arc::new(filter);
                        for pos in 0..state.schedules.len() {
                            spawn_bindings_page(
                                shared,
                                &batch2,
                                state,
                                pos,
                                Arc::clone(&filter),
                                Arc::new(Vec::new()),
                                None,
                            );
                        }
                    }),
                );
            }
        }
        shared.finish(post);
        batch.complete_unit();
    }

    /// Issue element-filtered bindings queries in capped slices.
    fn query_selected_elements(
        shared: &Arc<SessionShared>,
        elements: Vec<ElementId>,
        filter: BindingsFilter,
        skip_already_queried: bool,
        on_complete: CompletionCallback,
    ) {
        let batch = WorkBatch::new(on_complete);
        let mut post = Post::default();
        {
            let mut state = shared.state.lock();
            if state.connection.is_none() {
                warn!("query before reset_connection");
                batch.fail();
            } else if !elements.is_empty() {
                let batch2 = Arc::clone(&batch);
                ensure_schedules(
                    shared,
                    &mut state,
                    &batch,
                    &mut post,
                    Box::new(move |shared, state, _post| {
                        let filter = Arc::new(filter);
                        for pos in 0..state.schedules.len() {
                            let fresh: Vec<ElementId> = elements
                                .iter()
                                .copied()
                                .filter(|e| {
                                    state.schedules[pos].mark_element_queried(*e)
                                        || !skip_already_queried
                                })
                                .collect();
                            // The id set is size-capped per request; loop
                            // over successive slices until exhausted.
                            for chunk in fresh.chunks(ELEMENT_BATCH_MAX) {
                                spawn_bindings_page(
                                    shared,
                                    &batch2,
                                    state,
                                    pos,
                                    Arc::clone(&filter),
                                    Arc::new(chunk.to_vec()),
                                    None,
                                );
                            }
                        }
                    }),
                );
            }
        }
        shared.finish(post);
        batch.complete_unit();
    }
}

/// Enqueue one request under a batch, wrapping the handler with epoch
/// validation, locking, and deferred notification delivery.
fn enqueue(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    request: Request,
    handler: impl FnOnce(&Arc<SessionShared>, &Arc<WorkBatch>, &mut SessionState, Result<Document>, &mut Post)
        + Send
        + 'static,
) {
    batch.add_unit();
    let shared = Arc::clone(shared);
    let batch = Arc::clone(batch);
    let epoch = shared.epoch.load(Ordering::SeqCst);
    let client = Arc::clone(&shared.client);
    client.enqueue(
        request,
        Box::new(move |result| {
            let mut post = Post::default();
            if shared.epoch.load(Ordering::SeqCst) == epoch {
                let mut state = shared.state.lock();
                handler(&shared, &batch, &mut state, result, &mut post);
            } else {
                // Reset while in flight; the response is discarded.
                batch.fail();
            }
            shared.finish(post);
            batch.complete_unit();
        }),
    );
}

/// Run `action` once the schedule list is loaded, fetching it (with
/// generation detection) if nobody has yet.
fn ensure_schedules(
    shared: &Arc<SessionShared>,
    state: &mut SessionState,
    batch: &Arc<WorkBatch>,
    post: &mut Post,
    action: ScheduleAction,
) {
    if matches!(state.schedule_load, ScheduleLoad::Done) {
        action(shared, state, post);
        return;
    }
    batch.add_unit();
    let pending = PendingAction {
        batch: Arc::clone(batch),
        action,
    };
    match &mut state.schedule_load {
        ScheduleLoad::InFlight(waiters) => waiters.push(pending),
        load @ ScheduleLoad::NotStarted => {
            *load = ScheduleLoad::InFlight(vec![pending]);
            // First attempt always assumes Legacy; detection may fall
            // back to NextGen once.
            spawn_schedules_fetch(shared, batch, state, Generation::Legacy, None);
        }
        ScheduleLoad::Done => unreachable!("handled above"),
    }
}

fn spawn_schedules_fetch(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    generation: Generation,
    page_token: Option<String>,
) {
    let Some(connection) = &state.connection else {
        return;
    };
    let mut request = Request::schedules(generation, &connection.itwin_id);
    if let Some(token) = page_token {
        request = request.with_page_token(token);
    }
    enqueue(shared, batch, request, move |shared, batch, state, result, post| {
        handle_schedules_page(shared, batch, state, generation, result, post);
    });
}

fn handle_schedules_page(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &mut SessionState,
    generation: Generation,
    result: Result<Document>,
    post: &mut Post,
) {
    let page = result.and_then(Page::<ScheduleItem>::from_document);
    let page = match page {
        Ok(page) => page,
        Err(err) => {
            warn!(%err, "schedules fetch failed");
            batch.fail();
            fail_schedule_load(state, post);
            return;
        }
    };
    state.counters.pages_fetched += 1;

    let model_id = state
        .connection
        .as_ref()
        .map(|c| c.model_id.clone())
        .unwrap_or_default();
    for item in page.items {
        if item.i_model_id.as_deref() != Some(model_id.as_str()) {
            continue;
        }
        if state.schedule_pos(&item.id).is_none() {
            debug!(schedule = %item.id, ?generation, "discovered schedule");
            state.schedules.push(Schedule::new(
                item.id,
                item.name.unwrap_or_default(),
                generation,
                item.animated_entity_user_field_id,
            ));
        }
    }

    if let Some(token) = page.next_page_token {
        spawn_schedules_fetch(shared, batch, state, generation, Some(token));
        return;
    }

    // Last page: decide the generation.
    if state.schedules.is_empty()
        && generation == Generation::Legacy
        && !state.fallback_used
    {
        // Nothing matched under the Legacy assumption. Defined to fall
        // back to NextGen, once; switching back requires a full reset.
        state.fallback_used = true;
        debug!("no Legacy schedule for model; retrying as NextGen");
        spawn_schedules_fetch(shared, batch, state, Generation::NextGen, None);
        return;
    }

    state.generation = GenerationState::Detected(generation);
    if state.schedules.is_empty() {
        // Terminal, non-fatal: the caller observes an empty schedule set.
        warn!("no schedule found for model {model_id}");
    }
    let pending = match std::mem::replace(&mut state.schedule_load, ScheduleLoad::Done) {
        ScheduleLoad::InFlight(pending) => pending,
        _ => Vec::new(),
    };
    for p in pending {
        (p.action)(shared, state, post);
        post.units.push(p.batch);
    }
}

/// Fail every operation waiting on the schedule list and allow a retry.
fn fail_schedule_load(state: &mut SessionState, post: &mut Post) {
    if let ScheduleLoad::InFlight(pending) =
        std::mem::replace(&mut state.schedule_load, ScheduleLoad::NotStarted)
    {
        for p in pending {
            p.batch.fail();
            post.units.push(p.batch);
        }
    }
}

fn spawn_bindings_page(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    pos: usize,
    filter: Arc<BindingsFilter>,
    elements: Arc<Vec<ElementId>>,
    page_token: Option<String>,
) {
    let schedule = &state.schedules[pos];
    let body = filter.to_body(
        &elements,
        schedule
            .generation
            .uses_user_field()
            .then(|| schedule.user_field_id.as_deref())
            .flatten(),
    );
    let mut request = Request::bindings_query(&schedule.id, body);
    if let Some(token) = page_token {
        request = request.with_page_token(token);
    }
    enqueue(shared, batch, request, move |shared, batch, state, result, post| {
        handle_bindings_page(shared, batch, state, pos, filter, elements, result, post);
    });
}

#[allow(clippy::too_many_arguments)]
fn handle_bindings_page(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &mut SessionState,
    pos: usize,
    filter: Arc<BindingsFilter>,
    elements: Arc<Vec<ElementId>>,
    result: Result<Document>,
    post: &mut Post,
) {
    let doc = match result {
        Ok(doc) => doc,
        Err(err) => {
            // Transport failure: the page is not retried here and
            // pagination does not advance (retrying is the query
            // engine's contract).
            warn!(%err, "bindings page fetch failed");
            batch.fail();
            return;
        }
    };
    let outcome = match resolver::process_bindings_page(&mut state.schedules[pos], doc) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(%err, "bindings page undecodable");
            batch.fail();
            return;
        }
    };
    state.counters.pages_fetched += 1;
    state.counters.items_parsed += outcome.parsed;
    state.counters.items_skipped += outcome.skipped;

    for task_id in &outcome.fetch_tasks {
        spawn_task_fetch(shared, batch, state, pos, task_id.clone());
    }
    for profile_id in &outcome.fetch_profiles {
        spawn_profile_fetch(shared, batch, state, pos, profile_id.clone());
    }
    for fetch in &outcome.fetch_transforms {
        spawn_transform_fetch(shared, batch, state, pos, fetch.clone());
    }

    let schedule = &state.schedules[pos];
    for gidx in &outcome.groups_modified {
        post.groups.push(GroupNotice {
            schedule_id: schedule.id.clone(),
            group_id: schedule.groups.get(*gidx).id.clone(),
        });
    }
    state.build_timelines(pos, &outcome.newly_defined, post);

    // Pages are processed strictly in arrival order: the next page is
    // requested only from within this page's callback.
    if let Some(token) = outcome.next_page_token {
        spawn_bindings_page(shared, batch, state, pos, filter, elements, Some(token));
    }
}

fn spawn_task_fetch(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    pos: usize,
    task_id: String,
) {
    let request = Request::task(&state.schedules[pos].id, &task_id);
    enqueue(shared, batch, request, move |_shared, batch, state, result, post| {
        match result {
            Ok(doc) => match resolver::apply_task_details(&mut state.schedules[pos], &task_id, doc) {
                Ok(newly) => state.build_timelines(pos, &newly, post),
                Err(err) => {
                    // The task stays unresolved; its bindings remain in a
                    // permanent, observable incomplete state.
                    warn!(%err, %task_id, "task details unusable");
                }
            },
            Err(err) => {
                warn!(%err, %task_id, "task fetch failed");
                batch.fail();
            }
        }
    });
}

fn spawn_profile_fetch(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    pos: usize,
    profile_id: String,
) {
    let request = Request::appearance_profile(&state.schedules[pos].id, &profile_id);
    enqueue(shared, batch, request, move |_shared, batch, state, result, post| {
        match result {
            Ok(doc) => {
                match resolver::apply_profile_details(&mut state.schedules[pos], &profile_id, doc) {
                    Ok(newly) => state.build_timelines(pos, &newly, post),
                    Err(err) => {
                        warn!(%err, %profile_id, "profile details unusable");
                    }
                }
            }
            Err(err) => {
                warn!(%err, %profile_id, "profile fetch failed");
                batch.fail();
            }
        }
    });
}

fn spawn_transform_fetch(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    pos: usize,
    fetch: TransformFetch,
) {
    let schedule_id = &state.schedules[pos].id;
    let request = match fetch.route {
        TransformRoute::Static => Request::transform3d(schedule_id, &fetch.id),
        TransformRoute::PathAssignment => Request::path_assignment(schedule_id, &fetch.id),
    };
    enqueue(shared, batch, request, move |shared, batch, state, result, post| {
        handle_transform_response(shared, batch, state, pos, &fetch, result, post);
    });
}

fn handle_transform_response(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &mut SessionState,
    pos: usize,
    fetch: &TransformFetch,
    result: Result<Document>,
    post: &mut Post,
) {
    let doc = match result {
        Err(Error::PropertyNotFound(_)) => {
            // Invalid reference: the binding is still notified once its
            // other dependencies resolve, without a transform.
            let newly = resolver::apply_transform_unresolvable(&mut state.schedules[pos], &fetch.id);
            state.build_timelines(pos, &newly, post);
            return;
        }
        Err(err) => {
            warn!(%err, transform_id = %fetch.id, "transform fetch failed");
            batch.fail();
            return;
        }
        Ok(doc) => doc,
    };
    match fetch.route {
        TransformRoute::Static => {
            match resolver::apply_static_transform(&mut state.schedules[pos], &fetch.id, doc) {
                Ok(newly) => state.build_timelines(pos, &newly, post),
                Err(err) => warn!(%err, transform_id = %fetch.id, "transform undecodable"),
            }
        }
        TransformRoute::PathAssignment => {
            match resolver::apply_path_assignment(&mut state.schedules[pos], &fetch.id, doc) {
                Ok((fetch_path, newly)) => {
                    state.build_timelines(pos, &newly, post);
                    if let Some(path_id) = fetch_path {
                        spawn_path_keyframes(shared, batch, state, pos, path_id, None);
                    }
                }
                Err(err) => warn!(%err, assignment_id = %fetch.id, "path assignment undecodable"),
            }
        }
    }
}

fn spawn_path_keyframes(
    shared: &Arc<SessionShared>,
    batch: &Arc<WorkBatch>,
    state: &SessionState,
    pos: usize,
    path_id: String,
    page_token: Option<String>,
) {
    let mut request = Request::path_keyframes(&state.schedules[pos].id, &path_id);
    if let Some(token) = page_token {
        request = request.with_page_token(token);
    }
    enqueue(shared, batch, request, move |shared, batch, state, result, post| {
        let doc = match result {
            Ok(doc) => doc,
            Err(err) => {
                warn!(%err, %path_id, "path keyframes fetch failed");
                batch.fail();
                return;
            }
        };
        match resolver::apply_path_keyframes_page(&mut state.schedules[pos], &path_id, doc) {
            Ok((Some(token), _)) => {
                state.counters.pages_fetched += 1;
                spawn_path_keyframes(shared, batch, state, pos, path_id, Some(token));
            }
            Ok((None, newly)) => {
                state.counters.pages_fetched += 1;
                state.build_timelines(pos, &newly, post);
            }
            Err(err) => {
                warn!(%err, %path_id, "path keyframes undecodable");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_batch() -> (Arc<WorkBatch>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let success = Arc::new(AtomicBool::new(false));
        let calls2 = Arc::clone(&calls);
        let success2 = Arc::clone(&success);
        let batch = WorkBatch::new(Box::new(move |ok| {
            calls2.fetch_add(1, Ordering::SeqCst);
            success2.store(ok, Ordering::SeqCst);
        }));
        (batch, calls, success)
    }

    #[test]
    fn test_batch_sentinel_completes_once() {
        let (batch, calls, success) = counting_batch();
        batch.complete_unit();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(success.load(Ordering::SeqCst));
    }

    #[test]
    fn test_batch_waits_for_all_units() {
        let (batch, calls, _) = counting_batch();
        batch.add_unit();
        batch.add_unit();
        batch.complete_unit(); // sentinel
        batch.complete_unit();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        batch.complete_unit();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_failure_propagates() {
        let (batch, calls, success) = counting_batch();
        batch.add_unit();
        batch.fail();
        batch.complete_unit();
        batch.complete_unit();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!success.load(Ordering::SeqCst));
    }
}
