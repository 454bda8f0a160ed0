//! Lane queue driving real external commands. Unix only.
#![cfg(unix)]

use laneq::task::CommandError;
use laneq::{CommandTask, LaneQueue, TaskError};

#[tokio::test]
async fn command_output_is_captured() {
    let queue: LaneQueue = LaneQueue::new();

    let out = queue
        .submit("echo", CommandTask::new("echo").args(["hello", "lane"]))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(out.stdout.trim(), "hello lane");
}

#[tokio::test]
async fn non_zero_exit_is_a_failure_and_lane_continues() {
    let queue: LaneQueue = LaneQueue::new();

    let failing = queue
        .submit("sh", CommandTask::new("sh").args(["-c", "echo nope >&2; exit 3"]))
        .unwrap();
    let next = queue
        .submit("sh", CommandTask::new("sh").args(["-c", "printf $GREETING"]).env("GREETING", "hi"))
        .unwrap();

    match failing.await {
        Err(TaskError::Failed(CommandError::Exit { code, stderr, .. })) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr.trim(), "nope");
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
    assert_eq!(next.await.unwrap().stdout, "hi");
    assert!(queue.is_idle());
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let queue: LaneQueue = LaneQueue::new();

    let result = queue
        .submit("x", CommandTask::new("/nonexistent/laneq-test-binary"))
        .unwrap()
        .await;

    assert!(matches!(
        result,
        Err(TaskError::Failed(CommandError::Spawn { .. }))
    ));
}

#[tokio::test]
async fn commands_share_a_lane_in_order() {
    let dir = std::env::temp_dir().join(format!("laneq-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let queue: LaneQueue = LaneQueue::new();

    let write = queue
        .submit(
            "file",
            CommandTask::new("sh")
                .args(["-c", "sleep 0.05; echo first > log.txt"])
                .current_dir(&dir),
        )
        .unwrap();
    let append = queue
        .submit(
            "file",
            CommandTask::new("sh")
                .args(["-c", "echo second >> log.txt"])
                .current_dir(&dir),
        )
        .unwrap();

    write.await.unwrap();
    append.await.unwrap();

    let contents = std::fs::read_to_string(dir.join("log.txt")).unwrap();
    assert_eq!(contents, "first\nsecond\n");
    std::fs::remove_dir_all(&dir).unwrap();
}
