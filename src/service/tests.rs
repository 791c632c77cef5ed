use super::*;
use crate::auth::{AuthService, BcryptHasher, TokenAuthenticator};
use crate::error::ErrorCode;
use crate::protocol::{TaskFilters, TaskSortSpec};
use crate::store::{Role, Store, TaskPriority, TaskSort, TaskStatus};
use crate::subscription::{PushDispatcher, Subscriber, SubscriptionRegistry};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const HOUR_MS: i64 = 3_600_000;

struct Fixture {
    users: UserService,
    boards: Arc<BoardService>,
    tasks: TaskService,
    auth: AuthService,
    push: Arc<PushDispatcher>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(Store::in_memory().unwrap());
    let registry = Arc::new(SubscriptionRegistry::new());
    let push = Arc::new(
        PushDispatcher::bind("127.0.0.1:0".parse().unwrap(), registry)
            .await
            .unwrap(),
    );
    let tokens = Arc::new(TokenAuthenticator::new(b"service-test-secret").unwrap());
    let auth = AuthService::new(tokens, store.clone());
    let users = UserService::new(
        store.clone(),
        Arc::new(BcryptHasher::new(4)),
        auth.clone(),
        HOUR_MS,
    );
    let boards = Arc::new(BoardService::new(store.clone(), push.clone()));
    let tasks = TaskService::new(store, boards.clone(), push.clone());
    Fixture {
        users,
        boards,
        tasks,
        auth,
        push,
    }
}

/// Registers a user and returns its id.
async fn user(fx: &Fixture, name: &str) -> String {
    fx.users.register(name, "pass1234").await.unwrap().user.id
}

#[cfg(test)]
mod user_tests {
    use super::*;

    #[tokio::test]
    async fn register_logs_the_new_user_in() {
        let fx = fixture().await;
        let resp = fx.users.register("alice", "secret").await.unwrap();
        assert_eq!(resp.user.username, "alice");
        assert!(resp.expires_at > resp.user.created_at);

        let ctx = fx.auth.authenticate(&resp.token).unwrap();
        assert_eq!(ctx.user_id, resp.user.id);
    }

    #[tokio::test]
    async fn register_validates_input() {
        let fx = fixture().await;
        let err = fx.users.register("  ", "secret").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = fx.users.register("alice", "abc").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let fx = fixture().await;
        fx.users.register("alice", "secret").await.unwrap();
        let err = fx.users.register("alice", "other-secret").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn login_checks_password() {
        let fx = fixture().await;
        fx.users.register("alice", "secret").await.unwrap();

        let ok = fx.users.login("alice", "secret").await.unwrap();
        assert!(fx.auth.authenticate(&ok.token).is_ok());

        let err = fx.users.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthInvalid);

        let err = fx.users.login("nobody", "secret").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthInvalid);
    }

    #[tokio::test]
    async fn logout_revokes_only_that_session() {
        let fx = fixture().await;
        let first = fx.users.register("alice", "secret").await.unwrap();
        let second = fx.users.login("alice", "secret").await.unwrap();

        let ctx = fx.auth.authenticate(&first.token).unwrap();
        fx.users.logout(&ctx).unwrap();

        let err = crate::error::AppError::from(fx.auth.authenticate(&first.token).unwrap_err());
        assert_eq!(err.code(), ErrorCode::AuthInvalid);
        assert!(fx.auth.authenticate(&second.token).is_ok());
    }
}

#[cfg(test)]
mod board_tests {
    use super::*;

    #[tokio::test]
    async fn create_board_makes_caller_owner() {
        let fx = fixture().await;
        let alice = user(&fx, "alice").await;
        let board = fx.boards.create_board(&alice, "  Groceries ").unwrap();
        assert_eq!(board.name, "Groceries");

        let listed = fx.boards.list_boards_for_user(&alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, Role::Owner);
        assert_eq!(
            fx.boards.check_access_role(&alice, &board.id).unwrap(),
            Some(Role::Owner)
        );
    }

    #[tokio::test]
    async fn blank_board_name_is_rejected() {
        let fx = fixture().await;
        let alice = user(&fx, "alice").await;
        let err = fx.boards.create_board(&alice, "   ").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn add_member_rules() {
        let fx = fixture().await;
        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let carol = user(&fx, "carol").await;
        let board = fx.boards.create_board(&alice, "Work").unwrap();

        let err = fx.boards.add_member(&alice, "no-such-board", &bob).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = fx.boards.add_member(&bob, &board.id, &carol).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = fx.boards.add_member(&alice, &board.id, "no-such-user").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let member = fx.boards.add_member(&alice, &board.id, &bob).await.unwrap();
        assert_eq!(member.username, "bob");
        assert_eq!(member.role, "MEMBER");
        assert_eq!(
            fx.boards.check_access_role(&bob, &board.id).unwrap(),
            Some(Role::Member)
        );

        let err = fx.boards.add_member(&alice, &board.id, &bob).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn view_board_requires_access() {
        let fx = fixture().await;
        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let board = fx.boards.create_board(&alice, "Work").unwrap();

        let err = fx.boards.view_board(&bob, &board.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = fx.boards.view_board(&alice, "missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(fx.boards.check_access_role(&alice, "missing").unwrap(), None);

        fx.boards.add_member(&alice, &board.id, &bob).await.unwrap();
        let (summary, members) = fx.boards.view_board(&bob, &board.id).unwrap();
        assert_eq!(summary.role, "MEMBER");
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn add_member_pushes_to_subscribers() {
        let fx = fixture().await;
        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let board = fx.boards.create_board(&alice, "Work").unwrap();

        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sock.local_addr().unwrap().port();
        fx.push.registry().subscribe(
            &board.id,
            Subscriber::new("c1", alice.clone(), IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        );

        fx.boards.add_member(&alice, &board.id, &bob).await.unwrap();

        let mut buf = vec![0u8; 65_536];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), sock.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let msg: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(msg["event"], "member_added");
        assert_eq!(msg["member"]["userId"], bob.as_str());
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    async fn board_with_owner(fx: &Fixture) -> (String, String) {
        let alice = user(fx, "alice").await;
        let board = fx.boards.create_board(&alice, "Home").unwrap();
        (alice, board.id)
    }

    #[tokio::test]
    async fn add_task_defaults() {
        let fx = fixture().await;
        let (alice, board) = board_with_owner(&fx).await;
        let task = fx
            .tasks
            .add_task(&alice, &board, "Buy milk", None, None, None)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
    }

    #[tokio::test]
    async fn add_task_validation_and_access() {
        let fx = fixture().await;
        let (alice, board) = board_with_owner(&fx).await;
        let bob = user(&fx, "bob").await;

        let err = fx.tasks.add_task(&alice, &board, "  ", None, None, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = fx
            .tasks
            .add_task(&alice, &board, "x", None, Some("urgent"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = fx.tasks.add_task(&bob, &board, "x", None, None, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn update_status_normalizes_and_reports_missing() {
        let fx = fixture().await;
        let (alice, board) = board_with_owner(&fx).await;
        let task = fx
            .tasks
            .add_task(&alice, &board, "Buy milk", None, Some("HIGH"), None)
            .await
            .unwrap();

        let updated = fx
            .tasks
            .update_task_status(&alice, &board, &task.id, "in_progress")
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);

        let err = fx
            .tasks
            .update_task_status(&alice, &board, &task.id, "finished")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = fx
            .tasks
            .update_task_status(&alice, &board, "missing", "done")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn delete_task_then_missing() {
        let fx = fixture().await;
        let (alice, board) = board_with_owner(&fx).await;
        let task = fx
            .tasks
            .add_task(&alice, &board, "Buy milk", None, None, None)
            .await
            .unwrap();

        fx.tasks.delete_task(&alice, &board, &task.id).await.unwrap();
        let err = fx.tasks.delete_task(&alice, &board, &task.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(fx
            .tasks
            .list_tasks(&alice, &board, &Default::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_tasks_filters_and_sorts() {
        let fx = fixture().await;
        let (alice, board) = board_with_owner(&fx).await;
        for (title, prio) in [("a", "low"), ("b", "high"), ("c", "medium")] {
            fx.tasks
                .add_task(&alice, &board, title, None, Some(prio), None)
                .await
                .unwrap();
        }

        let query = build_task_query(
            None,
            Some(&TaskSortSpec {
                by: Some("priority".into()),
                order: Some("desc".into()),
            }),
        )
        .unwrap();
        let titles: Vec<String> = fx
            .tasks
            .list_tasks(&alice, &board, &query)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["b", "c", "a"]);

        let query = build_task_query(
            Some(&TaskFilters {
                priority: vec!["LOW".into(), "low".into()],
                ..Default::default()
            }),
            None,
        )
        .unwrap();
        assert_eq!(query.priorities, vec![TaskPriority::Low]);
        let listed = fx.tasks.list_tasks(&alice, &board, &query).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "a");
    }

    #[test]
    fn build_query_rejects_bad_filters_and_defaults_sort() {
        let bad_status = TaskFilters {
            status: vec!["someday".into()],
            ..Default::default()
        };
        assert_eq!(
            build_task_query(Some(&bad_status), None).unwrap_err().code(),
            ErrorCode::ValidationError
        );

        let odd_sort = TaskSortSpec {
            by: Some("title".into()),
            order: Some("sideways".into()),
        };
        let query = build_task_query(None, Some(&odd_sort)).unwrap();
        assert_eq!(query.sort, TaskSort::CreatedAt);
        assert!(!query.descending);

        let query = build_task_query(
            None,
            Some(&TaskSortSpec {
                by: Some("due".into()),
                order: Some("ASC".into()),
            }),
        )
        .unwrap();
        assert_eq!(query.sort, TaskSort::Due);
        assert!(!query.descending);
    }
}
