//! End-to-end dispatch: manager -> router -> rules -> adaptors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use beast_adaptors::{Adaptor, AdaptorError, AdaptorManager};
use beast_core::config::ManagerConfig;
use beast_core::{FileEntry, Message, MessageSink, ObjectType, Route};
use beast_manager::{CronScheduler, MessageManager};
use beast_router::{RouteDefinition, Router};
use beast_rules::compositing::{CompositingConfig, GENERATE_COMPOSITE};
use beast_rules::volume::{VolumeConfig, GENERATE_VOLUME};
use beast_rules::script::ScriptConfig;
use beast_rules::{RuleConfig, RuleContext, RuleError, ScriptRegistry, ScriptedRule, TimeoutManager};

// ── Harness ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Recording(Mutex<Vec<Route>>);

impl Recording {
    fn routes(&self) -> Vec<Route> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Adaptor for Recording {
    async fn handle(&self, route: &Route) -> Result<(), AdaptorError> {
        self.0.lock().unwrap().push(route.clone());
        Ok(())
    }

    fn kind(&self) -> &str {
        "recording"
    }
}

/// Forwards every trigger it sees.
struct EchoTrigger;

impl ScriptedRule for EchoTrigger {
    fn handle(&self, message: &Message) -> Result<Option<Message>, RuleError> {
        Ok(matches!(message, Message::Trigger { .. }).then(|| message.clone()))
    }
}

struct Pipeline {
    manager: Arc<MessageManager>,
    router: Arc<Router>,
    timeouts: Arc<TimeoutManager>,
    dex: Arc<Recording>,
}

fn pipeline(routes: Vec<RouteDefinition>) -> Pipeline {
    let timeouts = TimeoutManager::current();
    let scripts = ScriptRegistry::new();
    scripts.register("echo_trigger", |_| Ok(Box::new(EchoTrigger) as Box<dyn ScriptedRule>));
    let router = Arc::new(Router::new(RuleContext::new(Arc::clone(&timeouts), Arc::new(scripts))));
    for route in routes {
        router.register(route).unwrap();
    }
    let dex = Arc::new(Recording::default());
    let adaptors = Arc::new(AdaptorManager::new());
    adaptors.register("dex", Arc::clone(&dex) as Arc<dyn Adaptor>);

    let config = ManagerConfig {
        pool_size: 4,
        shutdown_grace_secs: 5,
    };
    let manager = MessageManager::start(Arc::clone(&router), adaptors, &config);
    let sink: Arc<dyn MessageSink> = manager.clone();
    timeouts.set_sink(&sink);
    Pipeline {
        manager,
        router,
        timeouts,
        dex,
    }
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn pvol(uuid: &str, source: &str, dt: NaiveDateTime) -> Message {
    Message::data_arrival(FileEntry::new(uuid, ObjectType::Pvol, source, dt))
}

fn scan(uuid: &str, source: &str, elangle: f64) -> Message {
    Message::data_arrival(FileEntry::new(uuid, ObjectType::Scan, source, at(10, 2)).with_elangle(elangle))
}

fn composite_route(timeout: u64) -> RouteDefinition {
    let mut config = CompositingConfig::new(
        "swegmaps_2000",
        vec!["seang".into(), "searl".into(), "sehud".into()],
    );
    config.timeout = timeout;
    RouteDefinition::new("composite", vec!["dex".into()], RuleConfig::Compositing(config))
}

fn generated(routes: &[Route]) -> Vec<(String, Vec<String>, Vec<String>)> {
    routes
        .iter()
        .filter_map(|r| match &r.payload {
            Message::Generate {
                algorithm,
                files,
                arguments,
            } => Some((algorithm.clone(), files.clone(), arguments.clone())),
            _ => None,
        })
        .collect()
}

/// Let workers pick up queued messages while the test clock is paused.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn wait_processed(manager: &MessageManager, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.stats().processed < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("message was not dispatched");
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn complete_composite_is_delivered_once() {
    let p = pipeline(vec![composite_route(0)]);
    p.manager.manage(pvol("u1", "seang", at(10, 0)));
    p.manager.manage(pvol("u2", "searl", at(10, 1)));
    p.manager.manage(pvol("u3", "sehud", at(10, 2)));
    p.manager.shutdown().await;

    let jobs = generated(&p.dex.routes());
    assert_eq!(jobs.len(), 1);
    let (algorithm, mut files, arguments) = jobs[0].clone();
    assert_eq!(algorithm, GENERATE_COMPOSITE);
    files.sort();
    assert_eq!(files, vec!["u1", "u2", "u3"]);
    assert!(arguments.contains(&"--area=swegmaps_2000".to_string()));
    assert!(arguments.contains(&"--date=20240501".to_string()));
    assert!(arguments.contains(&"--time=100000".to_string()));
}

#[tokio::test]
async fn late_arrival_does_not_regenerate() {
    let p = pipeline(vec![composite_route(0)]);
    for (uuid, source) in [("u1", "seang"), ("u2", "searl"), ("u3", "sehud")] {
        p.router.expand(&pvol(uuid, source, at(10, 0)));
    }
    p.manager.manage(pvol("u4", "seang", at(10, 5)));
    p.manager.shutdown().await;
    assert!(generated(&p.dex.routes()).is_empty());
}

#[tokio::test]
async fn ascending_volume_is_delivered() {
    let volume = VolumeConfig {
        timeout: 0,
        elevation_max: 24.0,
        ..VolumeConfig::default()
    };
    let p = pipeline(vec![RouteDefinition::new(
        "volume",
        vec!["dex".into()],
        RuleConfig::Volume(volume),
    )]);

    // One scan at a time: each is dispatched before the next is submitted.
    for (i, angle) in [0.5, 1.0, 1.5, 2.0, 25.0].iter().enumerate() {
        p.manager.manage(scan(&format!("s{i}"), "seang", *angle));
        wait_processed(&p.manager, i as u64 + 1).await;
    }
    p.manager.shutdown().await;

    let jobs = generated(&p.dex.routes());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].0, GENERATE_VOLUME);
    assert_eq!(jobs[0].1, vec!["s0", "s1", "s2", "s3"]);
}

#[tokio::test(start_paused = true)]
async fn timeout_flush_is_delivered_through_manager() {
    let p = pipeline(vec![composite_route(60)]);
    p.manager.manage(pvol("u1", "seang", at(10, 0)));
    p.manager.manage(pvol("u2", "searl", at(10, 0)));
    settle().await;
    assert_eq!(p.timeouts.pending(), 1);
    assert!(p.dex.routes().is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    p.manager.shutdown().await;

    let jobs = generated(&p.dex.routes());
    assert_eq!(jobs.len(), 1);
    let mut files = jobs[0].1.clone();
    files.sort();
    assert_eq!(files, vec!["u1", "u2"]);
    assert_eq!(p.timeouts.pending(), 0);
}

#[tokio::test]
async fn manage_after_shutdown_neither_panics_nor_blocks() {
    let p = pipeline(vec![composite_route(0)]);
    p.manager.shutdown().await;
    let manager = Arc::clone(&p.manager);
    tokio::time::timeout(Duration::from_secs(1), async move {
        manager.manage(pvol("late", "seang", at(10, 0)));
        manager.shutdown().await;
    })
    .await
    .expect("manage after shutdown blocked");
    assert!(p.dex.routes().is_empty());
    assert_eq!(p.manager.stats().dropped, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_slots_complete_concurrently() {
    let p = pipeline(vec![composite_route(0)]);
    let sources = ["seang", "searl", "sehud"];
    for hour in 0..8 {
        for source in sources {
            p.manager.manage(pvol(&format!("{hour}-{source}"), source, at(hour, 0)));
        }
    }
    p.manager.shutdown().await;

    let jobs = generated(&p.dex.routes());
    assert_eq!(jobs.len(), 8);
    assert!(jobs.iter().all(|(_, files, _)| files.len() == 3));
}

fn trigger_route(name: &str) -> RouteDefinition {
    RouteDefinition::new(
        name,
        vec!["dex".into()],
        RuleConfig::Script(ScriptConfig {
            script: "echo_trigger".into(),
            params: serde_json::Value::Null,
        }),
    )
}

#[tokio::test]
async fn cron_trigger_reaches_named_route_only() {
    let p = pipeline(vec![trigger_route("nightly"), trigger_route("hourly")]);
    let sink: Arc<dyn MessageSink> = p.manager.clone();
    let scheduler = CronScheduler::new(sink);
    let registered = Utc::now() - chrono::Duration::minutes(2);
    scheduler.register_at(1, "nightly", "* * * * *", registered).unwrap();

    assert_eq!(scheduler.tick(Utc::now()), vec!["nightly"]);
    p.manager.shutdown().await;

    assert_eq!(
        p.dex.routes(),
        vec![Route::new("dex", Message::trigger("nightly", "cron"))]
    );
}
