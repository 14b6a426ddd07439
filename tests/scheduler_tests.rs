
use std::sync::Arc;
use std::time::Duration;

use ticket_dispatch::config::{SchedulerConfig, WorkerMode};
use ticket_dispatch::fleet::{Fleet, HostInfo, ProcessControl};
use ticket_dispatch::monitor::WatchMonitor;
use ticket_dispatch::scheduler::{QueueStatus, ScriptKind, TicketIds, TicketStatus};
use ticket_dispatch::scripts::{ScriptSet, ScriptTable};
use ticket_dispatch::sim::{SimFleet, SimTarget};
use ticket_dispatch::target::ThreadPlan;

use test_harness::{fleet, scheduler};

fn growing_target(name: &str, grow: u32, weaken: u32) -> Arc<SimTarget> {
    Arc::new(
        SimTarget::new(name, 1000.0, 5.0)
            .with_money(500.0)
            .with_init_plan(ThreadPlan::new(0, grow, weaken))
            .with_attack_plan(ThreadPlan::new(2, 4, 1)),
    )
}

fn ready_target(name: &str, attack: ThreadPlan) -> Arc<SimTarget> {
    Arc::new(
        SimTarget::new(name, 1000.0, 5.0)
            .with_init_plan(ThreadPlan::default())
            .with_attack_plan(attack),
    )
}

#[test]
fn test_init_builds_queues_and_launchers() {
    let fleet = fleet(
        &[
            (HostInfo::home("home"), 64.0),
            (HostInfo::purchased("pserv-0"), 32.0),
            (HostInfo::remote("foodnstuff"), 16.0),
        ],
        None,
    );
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("n00dles", 1, 1), growing_target("joesguns", 1, 1)],
    );
    assert!(!s.is_initialized());

    s.init();
    assert!(s.is_initialized());
    assert_eq!(s.queues().len(), 2);
    assert_eq!(s.queues()[0].target_name(), "n00dles");
    assert_eq!(s.launchers().len(), 3);
    for path in ScriptSet::default().paths() {
        assert!(fleet.is_deployed("pserv-0", path));
    }
}

#[test]
fn test_worker_mode_filters_launchers() {
    let hosts = [
        (HostInfo::home("home"), 64.0),
        (HostInfo::purchased("pserv-0"), 32.0),
        (HostInfo::purchased("pserv-1"), 32.0),
        (HostInfo::remote("foodnstuff"), 16.0),
    ];

    let mut home_only = scheduler(
        SchedulerConfig::default().with_worker_mode(WorkerMode::Home),
        fleet(&hosts, None),
        vec![],
    );
    home_only.init();
    let names: Vec<_> = home_only.launchers().iter().map(|l| l.host()).collect();
    assert_eq!(names, vec!["home"]);

    let mut purchased = scheduler(
        SchedulerConfig::default().with_worker_mode(WorkerMode::Purchased),
        fleet(&hosts, None),
        vec![],
    );
    purchased.init();
    let names: Vec<_> = purchased.launchers().iter().map(|l| l.host()).collect();
    assert_eq!(names, vec!["pserv-0", "pserv-1"]);
}

#[test]
fn test_init_skips_hosts_without_root_or_scripts() {
    let table = ScriptTable::default();
    let fleet = Arc::new(
        SimFleet::new()
            .with_scripts(&ScriptSet::default(), &table, None)
            .with_host(HostInfo::home("home"), 64.0)
            .with_locked_host(HostInfo::remote("CSEC"), 8.0, true)
            .with_locked_host(HostInfo::remote("avmnite-02h"), 8.0, false)
            .with_host(HostInfo::remote("foodnstuff"), 16.0),
    );
    fleet.fail_deploy("foodnstuff");

    let mut s = scheduler(SchedulerConfig::default(), fleet.clone(), vec![]);
    s.init();

    let names: Vec<_> = s.launchers().iter().map(|l| l.host()).collect();
    assert_eq!(names, vec!["CSEC", "home"]);
    assert!(fleet.has_root("CSEC"));
    assert!(!fleet.has_root("avmnite-02h"));
}

#[tokio::test]
async fn test_calls_before_init_do_nothing() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("n00dles", 2, 1)],
    );
    assert_eq!(s.schedule_work(), 0);
    assert_eq!(s.run().await, 0);
    assert!(fleet.launches().is_empty());
}

#[tokio::test]
async fn test_run_dispatches_by_priority() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("joesguns", 10, 2)],
    );
    s.init();

    assert_eq!(s.schedule_work(), 1);
    assert_eq!(s.run().await, 12);

    let scripts: Vec<_> = fleet.launches().into_iter().map(|l| l.script).collect();
    assert_eq!(scripts, vec!["grow.js", "weaken.js"]);
    assert_eq!(s.in_flight().len(), 2);
    assert!(s.queues()[0].log().iter().all(|t| t.is_running()));
    assert!(s.queues()[0].unplaced_tickets().is_empty());

    // Nothing new to place.
    assert_eq!(s.run().await, 0);
}

#[tokio::test]
async fn test_finished_jobs_complete_tickets_and_unlock_attack() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let target = growing_target("joesguns", 10, 2);
    let mut s = scheduler(SchedulerConfig::default(), fleet.clone(), vec![target.clone()]);
    s.init();

    s.schedule_work();
    s.run().await;
    assert_eq!(s.schedule_work(), 0);

    fleet.finish_all();
    s.run().await;
    assert!(s.in_flight().is_empty());
    assert!(s.queues()[0].log().iter().all(|t| t.is_done()));

    assert_eq!(s.schedule_work(), 1);
    assert_eq!(s.queues()[0].status(), QueueStatus::Running);
    assert_eq!(target.attack_calls().len(), 1);

    s.run().await;
    let scripts: Vec<_> = fleet.launches().into_iter().map(|l| l.script).collect();
    assert_eq!(
        scripts,
        vec!["grow.js", "weaken.js", "hack.js", "grow.js", "weaken.js"]
    );
}

#[tokio::test]
async fn test_ticket_split_across_workers() {
    let fleet = fleet(
        &[
            (HostInfo::remote("foodnstuff"), 8.0),
            (HostInfo::remote("sigma-cosmetics"), 8.0),
        ],
        None,
    );
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![ready_target("n00dles", ThreadPlan::new(8, 0, 0))],
    );
    s.init();

    s.schedule_work();
    s.schedule_work();
    assert_eq!(s.run().await, 8);

    let mut placed: Vec<_> = fleet
        .launches()
        .into_iter()
        .map(|l| (l.host, l.threads))
        .collect();
    placed.sort();
    assert_eq!(
        placed,
        vec![("foodnstuff".to_string(), 4), ("sigma-cosmetics".to_string(), 4)]
    );
    assert_eq!(s.in_flight().len(), 2);

    let ticket = s.queues()[0].log().last().unwrap().clone();
    assert_eq!(ticket.status(), TicketStatus::Running);

    // One slice exiting is not enough.
    fleet.kill("hack.js", "foodnstuff", &s.in_flight()[0].args);
    s.run().await;
    assert_eq!(ticket.status(), TicketStatus::Running);

    fleet.finish_all();
    s.run().await;
    assert!(ticket.is_done());
}

#[tokio::test]
async fn test_short_capacity_leaves_remainder_pending() {
    let fleet = fleet(&[(HostInfo::remote("n00dles"), 2.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("joesguns", 10, 0)],
    );
    s.init();

    s.schedule_work();
    assert_eq!(s.run().await, 1);
    let ticket = s.queues()[0].unplaced_tickets()[0].clone();
    assert_eq!(ticket.status(), TicketStatus::Initiating);
    assert_eq!(ticket.unplaced_threads(), 9);

    // Host is full; retried next tick without error.
    assert_eq!(s.run().await, 0);
    assert_eq!(ticket.unplaced_threads(), 9);

    fleet.finish_all();
    assert_eq!(s.run().await, 1);
    assert_eq!(ticket.placed_threads(), 2);
    assert!(!ticket.is_done());
}

#[tokio::test]
async fn test_most_expensive_ticket_first_within_priority() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("n00dles", 3, 0), growing_target("joesguns", 5, 0)],
    );
    s.init();

    s.schedule_work();
    s.run().await;
    let threads: Vec<_> = fleet.launches().into_iter().map(|l| l.threads).collect();
    assert_eq!(threads, vec![5, 3]);
}

#[tokio::test]
async fn test_spare_ram_goes_to_share() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default().with_share_spare_ram(true),
        fleet.clone(),
        vec![ready_target("foodnstuff", ThreadPlan::default())],
    );
    s.init();

    s.schedule_work();
    assert_eq!(s.queues()[0].status(), QueueStatus::Initiating);
    assert_eq!(s.queues()[0].ticket_count(), 0);

    s.schedule_work();
    assert_eq!(s.queues()[0].status(), QueueStatus::Running);
    let share = s.queues()[0].log().last().unwrap().clone();
    assert_eq!(share.kind(), ScriptKind::Share);
    // floor(64 / 4.01)
    assert_eq!(share.threads(), 15);

    s.run().await;
    let launches = fleet.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].script, "share.js");
    assert_eq!(launches[0].threads, 15);
    assert!(share.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_share_never_asks_for_more_than_a_host_fits() {
    // One share thread needs 4.0 plus the launch epsilon, so nothing fits.
    let fleet = fleet(&[(HostInfo::home("home"), 4.0)], None);
    let target = ready_target("n00dles", ThreadPlan::default());
    let mut s = scheduler(
        SchedulerConfig::default().with_share_spare_ram(true),
        fleet.clone(),
        vec![target.clone()],
    );
    s.init();

    let mut advanced = Vec::new();
    for _ in 0..20 {
        advanced.push(s.schedule_work());
        tokio::time::sleep(Duration::from_secs(2)).await;
        s.run().await;
    }

    assert_eq!(advanced, vec![1; 20]);
    assert_eq!(target.attack_calls().len(), 19);
    assert!(fleet.launches().is_empty());
    assert!(s.queues()[0].log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_share_sized_per_host() {
    // 3 x 6.0 holds one share thread per host, though the sum would fit four.
    let fleet = fleet(
        &[
            (HostInfo::home("home"), 6.0),
            (HostInfo::purchased("pserv-0"), 6.0),
            (HostInfo::purchased("pserv-1"), 6.0),
        ],
        None,
    );
    let mut s = scheduler(
        SchedulerConfig::default().with_share_spare_ram(true),
        fleet.clone(),
        vec![ready_target("n00dles", ThreadPlan::default())],
    );
    s.init();
    s.schedule_work();
    s.schedule_work();

    let share = s.queues()[0].log().last().unwrap().clone();
    assert_eq!(share.threads(), 3);
    assert_eq!(s.run().await, 3);
    assert!(share.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_kills_in_flight_jobs() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut config = SchedulerConfig::default();
    config.kill_on_cleanup = true;
    let mut s = scheduler(config, fleet.clone(), vec![growing_target("joesguns", 4, 1)]);
    s.init();
    s.schedule_work();
    s.run().await;
    assert_eq!(fleet.process_count("home"), 2);

    s.cleanup().await;
    assert!(!s.is_initialized());
    assert!(s.queues().is_empty());
    assert!(s.launchers().is_empty());
    assert!(s.in_flight().is_empty());
    assert_eq!(fleet.process_count("home"), 0);
    assert_eq!(s.run().await, 0);
}

#[tokio::test]
async fn test_cleanup_without_kill_leaves_jobs_running() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet.clone(),
        vec![growing_target("joesguns", 4, 1)],
    );
    s.init();
    s.schedule_work();
    s.run().await;

    s.cleanup().await;
    assert!(s.in_flight().is_empty());
    assert_eq!(fleet.process_count("home"), 2);

    s.init();
    assert_eq!(s.queues()[0].status(), QueueStatus::Created);
}

#[tokio::test]
async fn test_run_publishes_snapshot() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], Some(Duration::from_secs(60)));
    let (monitor, rx) = WatchMonitor::new();
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet,
        vec![growing_target("joesguns", 10, 2)],
    )
    .with_monitor(Arc::new(monitor));
    s.init();
    s.schedule_work();
    s.run().await;

    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.queues.len(), 1);
    assert_eq!(snapshot.queues[0].target, "joesguns");
    assert_eq!(snapshot.queues[0].tickets, 2);
    assert!(snapshot.queues[0].outstanding);
    assert_eq!(snapshot.in_flight, 2);
    assert_eq!(snapshot.workers.len(), 1);
    assert!((snapshot.ticket_ram - 21.0).abs() < 1e-9);
    assert!((snapshot.total_free_ram - 43.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_injected_ticket_ids() {
    let fleet = fleet(&[(HostInfo::home("home"), 64.0)], None);
    let mut s = scheduler(
        SchedulerConfig::default(),
        fleet,
        vec![growing_target("joesguns", 10, 2)],
    )
    .with_ids(Arc::new(TicketIds::starting_at(500)));
    s.init();
    s.schedule_work();

    let ids: Vec<_> = s.queues()[0].log().iter().map(|t| t.id().0).collect();
    assert_eq!(ids, vec![500, 501]);
    assert_eq!(s.in_flight().len(), 0);
}
