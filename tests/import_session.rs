//! End-to-end import session tests against an in-memory transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use sync4d::prelude::*;
use sync4d::resolve::Document;

/// Transport backed by a closure; counts fetches per route kind.
struct FnTransport<F>(F);

impl<F> Transport for FnTransport<F>
where
    F: Fn(&Request) -> sync4d::Result<Document> + Send + Sync,
{
    fn fetch(&self, request: &Request) -> sync4d::Result<Document> {
        (self.0)(request)
    }
}

fn task_doc(id: &str, start: &str, finish: &str) -> Value {
    json!({
        "id": id,
        "name": format!("task {id}"),
        "plannedStart": start,
        "plannedFinish": finish
    })
}

fn install_profile_doc(id: &str) -> Value {
    json!({
        "id": id,
        "action": "install",
        "activeAppearance": { "transparency": 50.0 }
    })
}

fn schedules_page(schedule_id: &str, model_id: &str) -> Value {
    json!({
        "items": [
            { "id": schedule_id, "name": "North Tower", "iModelId": model_id }
        ]
    })
}

fn connected_session(
    transport: impl Fn(&Request) -> sync4d::Result<Document> + Send + Sync + 'static,
) -> (Arc<QueuedClient>, ImportSession) {
    let client = Arc::new(QueuedClient::new(Arc::new(FnTransport(transport))));
    let session = ImportSession::new(client.clone());
    session.reset_connection("itwin-1", "model-1", "cs-1");
    (client, session)
}

#[test]
fn pagination_completeness() {
    // Five binding items, three pages: every page is fetched exactly once
    // and every distinct item lands in the binding table.
    let bindings_fetches = Arc::new(AtomicUsize::new(0));
    let task_fetches = Arc::new(AtomicUsize::new(0));
    let counters = (bindings_fetches.clone(), task_fetches.clone());

    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            counters.0.fetch_add(1, Ordering::SeqCst);
            let item = |i: u64| {
                json!({
                    "animatedEntityId": format!("0x{:x}", 0x20 + i),
                    "taskId": "T1",
                    "appearanceProfileId": "A1"
                })
            };
            return Ok(match request.page_token.as_deref() {
                None => json!({ "items": [item(0), item(1)], "nextPageToken": "p2" }),
                Some("p2") => json!({ "items": [item(2), item(3)], "nextPageToken": "p3" }),
                Some("p3") => json!({ "items": [item(4)] }),
                Some(other) => panic!("unexpected page token {other}"),
            });
        }
        if path.ends_with("/tasks/T1") {
            counters.1.fetch_add(1, Ordering::SeqCst);
            return Ok(task_doc("T1", "1970-01-01T00:10:00Z", "1970-01-01T00:20:00Z"));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(install_profile_doc("A1"));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    let completed = Arc::new(AtomicBool::new(false));
    let completed2 = completed.clone();
    session.query_entire_schedule(
        None,
        None,
        Box::new(move |ok| {
            assert!(ok);
            completed2.store(true, Ordering::SeqCst);
        }),
    );
    client.run_until_idle();

    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(bindings_fetches.load(Ordering::SeqCst), 3);
    // One task shared by five bindings: exactly one detail fetch.
    assert_eq!(task_fetches.load(Ordering::SeqCst), 1);

    let stats = session.stats();
    assert_eq!(stats.bindings, 5);
    assert_eq!(stats.notified_bindings, 5);
    assert_eq!(stats.tasks, 1);
    assert_eq!(stats.timelines, 5);
}

#[test]
fn duplicate_binding_across_pages_notifies_once() {
    // The same (task, element, profile) tuple on two pages: one binding,
    // one notification, fired only after both details resolve.
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            let item = json!({
                "animatedEntityId": "0x20",
                "taskId": "T1",
                "appearanceProfileId": "A1"
            });
            return Ok(match request.page_token.as_deref() {
                None => json!({ "items": [item], "nextPageToken": "p2" }),
                _ => json!({ "items": [item] }),
            });
        }
        if path.ends_with("/tasks/T1") {
            return Ok(task_doc("T1", "1970-01-01T00:10:00Z", "1970-01-01T00:20:00Z"));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(install_profile_doc("A1"));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    let notifications = Arc::new(AtomicUsize::new(0));
    let notifications2 = notifications.clone();
    session.set_observers(
        Some(Box::new(move |_notice| {
            notifications2.fetch_add(1, Ordering::SeqCst);
        })),
        None,
    );
    session.query_entire_schedule(None, None, Box::new(|ok| assert!(ok)));
    client.run_until_idle();

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(session.stats().bindings, 1);
}

#[test]
fn empty_element_set_completes_immediately() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetches2 = fetches.clone();
    let transport = move |_request: &Request| -> sync4d::Result<Document> {
        fetches2.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "items": [] }))
    };

    let (client, session) = connected_session(transport);
    let completed = Arc::new(AtomicBool::new(false));
    let completed2 = completed.clone();
    session.query_elements_tasks(
        &[],
        None,
        None,
        Box::new(move |ok| {
            assert!(ok);
            completed2.store(true, Ordering::SeqCst);
        }),
    );

    // The callback fires before the queue is ever pumped.
    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(client.run_until_idle(), 0);
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn generation_falls_back_to_next_gen() {
    let legacy_fetches = Arc::new(AtomicUsize::new(0));
    let legacy2 = legacy_fetches.clone();
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            legacy2.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({ "items": [] }));
        }
        if path.starts_with("/schedules?contextId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            return Ok(json!({ "items": [] }));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    session.query_entire_schedule(None, None, Box::new(|ok| assert!(ok)));
    client.run_until_idle();

    assert_eq!(legacy_fetches.load(Ordering::SeqCst), 1);
    session.with_schedules(|schedules| {
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].generation, Generation::NextGen);
    });
}

#[test]
fn around_element_widens_by_timeline_extent() {
    // Task runs 600..1200; margins 60 before and 120 after must produce a
    // second, time-filtered query for 540..1320.
    let bodies = Arc::new(Mutex::new(Vec::<Value>::new()));
    let bodies2 = bodies.clone();
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            let body = request.body.clone().unwrap_or_else(|| json!({}));
            let first = body.get("animatedEntityIds").is_some();
            bodies2.lock().push(body);
            if first {
                return Ok(json!({ "items": [{
                    "animatedEntityId": "0x20",
                    "taskId": "T1",
                    "appearanceProfileId": "A1"
                }]}));
            }
            return Ok(json!({ "items": [] }));
        }
        if path.ends_with("/tasks/T1") {
            return Ok(task_doc("T1", "1970-01-01T00:10:00Z", "1970-01-01T00:20:00Z"));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(install_profile_doc("A1"));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    let completed = Arc::new(AtomicBool::new(false));
    let completed2 = completed.clone();
    session.query_around_element_tasks(
        ElementId(0x20),
        60.0,
        120.0,
        Box::new(move |ok| {
            assert!(ok);
            completed2.store(true, Ordering::SeqCst);
        }),
    );
    client.run_until_idle();
    assert!(completed.load(Ordering::SeqCst));

    let bodies = bodies.lock();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["animatedEntityIds"][0], "0x20");
    assert!(bodies[0].get("startTime").is_none());
    assert_eq!(bodies[1]["startTime"], "1970-01-01T00:09:00Z");
    assert_eq!(bodies[1]["endTime"], "1970-01-01T00:22:00Z");
}

#[test]
fn around_element_without_timeline_skips_second_query() {
    let query_count = Arc::new(AtomicUsize::new(0));
    let query_count2 = query_count.clone();
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            query_count2.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({ "items": [] }));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    let completed = Arc::new(AtomicBool::new(false));
    let completed2 = completed.clone();
    session.query_around_element_tasks(
        ElementId(0x99),
        60.0,
        120.0,
        Box::new(move |ok| {
            assert!(ok);
            completed2.store(true, Ordering::SeqCst);
        }),
    );
    client.run_until_idle();

    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(query_count.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_invalidates_in_flight_callbacks() {
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        if request.path.starts_with("/schedules?") {
            return Ok(schedules_page("S1", "model-1"));
        }
        Ok(json!({ "items": [] }))
    };

    let (client, session) = connected_session(transport);
    let got_success = Arc::new(AtomicBool::new(true));
    let got_success2 = got_success.clone();
    session.query_entire_schedule(
        None,
        None,
        Box::new(move |ok| {
            got_success2.store(ok, Ordering::SeqCst);
        }),
    );

    // Reset to a different model while the schedules fetch is queued.
    session.reset_connection("itwin-1", "model-2", "cs-1");
    client.run_until_idle();

    // The stale response was discarded and the operation reported failure.
    assert!(!got_success.load(Ordering::SeqCst));
    session.with_schedules(|schedules| assert!(schedules.is_empty()));
}

#[test]
fn static_transform_and_growth_full_flow() {
    // One binding with a static transform and a growth profile; after the
    // import plus geometry finalization, all four tracks are populated.
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            return Ok(json!({ "items": [{
                "animatedEntityId": "0x20",
                "taskId": "T1",
                "appearanceProfileId": "A1",
                "transformId": "X1"
            }]}));
        }
        if path.ends_with("/tasks/T1") {
            return Ok(task_doc("T1", "1970-01-01T00:10:00Z", "1970-01-01T00:20:00Z"));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(json!({
                "id": "A1",
                "action": "install",
                "activeAppearance": {
                    "color": { "red": 0, "green": 200, "blue": 0 },
                    "transparency": 25.0,
                    "growthSimulation": { "direction": "bottomUp" }
                }
            }));
        }
        if path.ends_with("/animation3dTransforms/X1") {
            // Row-major, translation in the last row.
            let mut m = vec![0.0; 16];
            m[0] = 1.0;
            m[5] = 1.0;
            m[10] = 1.0;
            m[15] = 1.0;
            m[12] = 5.0;
            return Ok(json!(m));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    session.query_entire_schedule(None, None, Box::new(|ok| assert!(ok)));
    client.run_until_idle();

    let key = TimelineKey::Element(ElementId(0x20));
    session.finalize_entity_geometry(
        &key,
        &BBox3d::new(glam::DVec3::splat(-1.0), glam::DVec3::splat(1.0)),
    );

    session.with_timelines(|timelines| {
        let tl = timelines.get(&key).expect("timeline built");
        // Hidden before, translucent during, visible after.
        assert_eq!(tl.alpha_at(0.0), 0.0);
        assert!((tl.alpha_at(900.0) - 0.75).abs() < 1e-12);
        assert_eq!(tl.alpha_at(2000.0), 1.0);
        // Static transform applies during the task only.
        assert_eq!(tl.transform_at(900.0).unwrap().position.x, 5.0);
        assert!(tl.transform_at(2000.0).is_none());
        // Growth plane finalized over the shifted, 1%-expanded box.
        let plane = tl.cutting_plane_at(599.0).unwrap();
        assert_eq!(plane.growth, GrowthStatus::FullyRemoved);
        assert!((plane.distance - (-1.02)).abs() < 1e-9);
    });
}

#[test]
fn group_binding_builds_one_timeline() {
    let group_notices = Arc::new(AtomicUsize::new(0));
    let group_notices2 = group_notices.clone();
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            return Ok(json!({ "items": [
                { "animatedEntityId": "0x20", "taskId": "T1",
                  "appearanceProfileId": "A1", "resourceGroupId": "G1" },
                { "animatedEntityId": "0x21", "taskId": "T1",
                  "appearanceProfileId": "A1", "resourceGroupId": "G1" }
            ]}));
        }
        if path.ends_with("/tasks/T1") {
            return Ok(task_doc("T1", "1970-01-01T00:10:00Z", "1970-01-01T00:20:00Z"));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(install_profile_doc("A1"));
        }
        panic!("unexpected request {path}");
    };

    let (client, session) = connected_session(transport);
    session.set_observers(
        None,
        Some(Box::new(move |_notice| {
            group_notices2.fetch_add(1, Ordering::SeqCst);
        })),
    );
    session.query_entire_schedule(None, None, Box::new(|ok| assert!(ok)));
    client.run_until_idle();

    assert_eq!(group_notices.load(Ordering::SeqCst), 2);
    let stats = session.stats();
    assert_eq!(stats.bindings, 1);
    assert_eq!(stats.groups, 1);
    assert_eq!(stats.timelines, 1);
    session.with_timelines(|timelines| {
        assert!(timelines.get(&TimelineKey::Group("G1".into())).is_some());
    });
}

#[test]
fn worker_pool_import_is_thread_safe() {
    // The same flow as pagination_completeness, but over the bounded
    // worker pool: callbacks land on arbitrary threads and contend for
    // the session lock.
    let transport = move |request: &Request| -> sync4d::Result<Document> {
        let path = request.path.as_str();
        if path.starts_with("/schedules?projectId") {
            return Ok(schedules_page("S1", "model-1"));
        }
        if path.ends_with("/animationBindings/query") {
            let items: Vec<Value> = (0..40)
                .map(|i| {
                    json!({
                        "animatedEntityId": format!("0x{:x}", 0x100 + i),
                        "taskId": format!("T{}", i % 4),
                        "appearanceProfileId": "A1"
                    })
                })
                .collect();
            return Ok(json!({ "items": items }));
        }
        if path.contains("/tasks/") {
            return Ok(task_doc(
                path.rsplit('/').next().unwrap(),
                "1970-01-01T00:10:00Z",
                "1970-01-01T00:20:00Z",
            ));
        }
        if path.ends_with("/appearanceProfiles/A1") {
            return Ok(install_profile_doc("A1"));
        }
        panic!("unexpected request {path}");
    };

    let pool = Arc::new(WorkerPool::spawn(Arc::new(FnTransport(transport)), 4));
    let session = ImportSession::new(pool);
    session.reset_connection("itwin-1", "model-1", "cs-1");

    let (tx, rx) = std::sync::mpsc::channel();
    session.query_entire_schedule(
        None,
        None,
        Box::new(move |ok| {
            let _ = tx.send(ok);
        }),
    );
    let ok = rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .expect("completion");
    assert!(ok);

    let stats = session.stats();
    assert_eq!(stats.bindings, 40);
    assert_eq!(stats.notified_bindings, 40);
    assert_eq!(stats.tasks, 4);
}
