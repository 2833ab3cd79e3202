//! Multi-client dispatch end-to-end scenarios (spec.md §8, scenarios 4-6).

mod common;

use common::ScriptedTransport;
use rportd_fleet::dispatch::{MultiJobRequest, dispatch_multi_job};
use tokio_util::sync::CancellationToken;
use rportd_fleet::jobs::JobStatus;

fn request(client_ids: &[&str], concurrent: bool, abort_on_err: bool) -> MultiJobRequest {
    MultiJobRequest {
        client_ids: client_ids.iter().map(|s| s.to_string()).collect(),
        command: "uptime".into(),
        timeout_sec: 5,
        concurrent,
        abort_on_err,
        interpreter: None,
        cwd: None,
        is_sudo: false,
    }
}

#[tokio::test]
async fn sequential_abort_on_error_skips_remaining_clients() {
    let fleet = common::test_fleet().await;
    common::attach_scripted(&fleet, "a", ScriptedTransport::failing()).await;
    common::attach_scripted(&fleet, "b", ScriptedTransport::succeeding()).await;
    common::attach_scripted(&fleet, "c", ScriptedTransport::succeeding()).await;

    let req = request(&["a", "b", "c"], false, true);
    let multi = dispatch_multi_job(
        &fleet,
        "m1".into(),
        "alice".into(),
        &["a".into(), "b".into(), "c".into()],
        req,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let job_a = multi.jobs.iter().find(|j| j.client_id == "a").unwrap();
    assert_eq!(job_a.status, JobStatus::Failed);
    assert_eq!(job_a.exit_code, Some(1));

    for id in ["b", "c"] {
        let job = multi.jobs.iter().find(|j| j.client_id == id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("aborted due to prior failure"));
        assert!(job.exit_code.is_none());
    }

    assert_eq!(multi.derived_status(), JobStatus::Failed);
}

#[tokio::test]
async fn concurrent_with_one_offline_does_not_abort_others() {
    let fleet = common::test_fleet().await;
    common::attach_scripted(&fleet, "a", ScriptedTransport::succeeding()).await;
    // "b" is never attached: offline.
    common::attach_scripted(&fleet, "c", ScriptedTransport::succeeding()).await;

    let req = request(&["a", "b", "c"], true, false);
    let multi = dispatch_multi_job(
        &fleet,
        "m1".into(),
        "alice".into(),
        &["a".into(), "b".into(), "c".into()],
        req,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let job_a = multi.jobs.iter().find(|j| j.client_id == "a").unwrap();
    assert_eq!(job_a.status, JobStatus::Successful);

    let job_b = multi.jobs.iter().find(|j| j.client_id == "b").unwrap();
    assert_eq!(job_b.status, JobStatus::Failed);
    assert_eq!(job_b.error.as_deref(), Some("client not connected"));

    let job_c = multi.jobs.iter().find(|j| j.client_id == "c").unwrap();
    assert_eq!(job_c.status, JobStatus::Successful);

    assert_eq!(multi.derived_status(), JobStatus::Failed);
}

#[tokio::test]
async fn supersession_closes_old_session_and_tunnels() {
    let fleet = common::test_fleet().await;
    let s1 = common::attach_scripted(&fleet, "x", ScriptedTransport::succeeding()).await;
    s1.tunnels
        .create(
            "t1".into(),
            rportd_fleet::state::RemoteSpec {
                scheme: "tcp".into(),
                local_host: "127.0.0.1".into(),
                local_port: 0,
                remote_host: "10.0.0.5".into(),
                remote_port: 22,
                protocol: None,
                acl: None,
                idle_timeout: None,
                auto_close: None,
                reverse_proxy: false,
                host_header: None,
                http_proxy: false,
                skip_idle_timer: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(s1.tunnels.len(), 1);

    let s2 = common::attach_scripted(&fleet, "x", ScriptedTransport::succeeding()).await;

    assert!(s1.is_superseded());
    assert!(s1.tunnels.is_empty(), "superseded session's tunnels must be closed");
    assert!(fleet.sessions.get("x").is_some());
    assert_eq!(s2.tunnels.list().len(), 0);
}

#[tokio::test]
async fn empty_permitted_set_completes_immediately() {
    let fleet = common::test_fleet().await;
    let req = request(&["a"], false, false);
    let multi = dispatch_multi_job(&fleet, "m1".into(), "alice".into(), &[], req, CancellationToken::new())
        .await
        .unwrap();
    assert!(multi.jobs.is_empty());
    assert_eq!(multi.derived_status(), JobStatus::Successful);
}
