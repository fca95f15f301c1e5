/// Record executor tests
///
/// CRUD over derived records: shard routing, sequence allocation, SQL shape
/// and the transaction each statement runs in.
/// Run with: cargo test --test executor_tests
mod common;

use chrono::NaiveDateTime;
use common::*;
use gameshard::connection::MockConnector;
use gameshard::{
    Condition, DbError, Options, OrderBy, Predicate, Record, RecordExecutor, Row, Value,
};

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "user_item")]
struct UserItem {
    #[sql(pk, seq)]
    id: u64,
    #[sql(shard_key)]
    user_id: u64,
    item_id: u32,
    count: i64,
    created_at: Option<NaiveDateTime>,
}

#[derive(Record, Debug, Clone, PartialEq)]
struct User {
    #[sql(pk, shard_key)]
    id: u64,
    name: String,
    #[sql(skip)]
    dirty: bool,
}

fn item(id: u64, user_id: u64, count: i64) -> UserItem {
    UserItem {
        id,
        user_id,
        item_id: 5,
        count,
        created_at: None,
    }
}

fn item_row(item: &UserItem) -> Row {
    Row::from_pairs([
        ("id", Value::from(item.id)),
        ("user_id", Value::from(item.user_id)),
        ("item_id", Value::from(item.item_id)),
        ("count", Value::from(item.count)),
        ("created_at", Value::Null),
    ])
}

#[test]
fn test_derived_schema() {
    let schema = UserItem::schema();
    assert_eq!(schema.table(), "user_item");
    assert_eq!(
        schema.column_names(),
        vec!["id", "user_id", "item_id", "count", "created_at"]
    );
    assert_eq!(schema.shard_key_column().unwrap().name, "user_id");
    assert_eq!(schema.sequence_column().unwrap().name, "id");
    assert!(schema.validate().is_ok());

    assert_eq!(User::schema().table(), "user");
    assert_eq!(User::schema().column_names(), vec!["id", "name"]);
    assert_eq!(item(0, 1, 1).sequence(), Some(0));
    assert_eq!(User { id: 1, name: "a".into(), dirty: true }.sequence(), None);
}

#[tokio::test]
async fn test_create_allocates_sequence_and_routes_to_shard() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.seed_sequence("user_item", 99);
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(2)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut new_item = item(0, 77, 3);
    assert_eq!(items.create(&mut ctx, &mut new_item).await.unwrap(), 1);
    assert_eq!(new_item.id, 100);
    ctx.commit().await.unwrap();
    ctx.rollback().await.unwrap();

    let statements = connector.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[0].target, MASTER_W);
    assert_eq!(statements[0].sql, "UPDATE seq_user_item SET id = id + ?");
    assert_eq!(statements[1].sql, "SELECT MAX(id) AS id FROM seq_user_item");

    let insert = &statements[2];
    assert_eq!(insert.target, SHARD2_W);
    assert!(insert.in_transaction);
    assert_eq!(
        insert.sql,
        "INSERT IGNORE INTO user_item (id, user_id, item_id, count) VALUES (?, ?, ?, ?)"
    );
    assert_eq!(
        insert.args,
        vec![
            Value::Unsigned(100),
            Value::Unsigned(77),
            Value::Unsigned(5),
            Value::Integer(3)
        ]
    );
    assert_eq!(
        labels_of(&connector, "commit"),
        vec![MASTER_W, SHARD1_W, SHARD2_W]
    );
}

#[tokio::test]
async fn test_create_multi_reserves_one_block() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.seed_sequence("user_item", 10);
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut batch = vec![item(0, 77, 1), item(500, 77, 2), item(0, 77, 3)];
    items.create_multi(&mut ctx, &mut batch).await.unwrap();

    let ids: Vec<u64> = batch.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![11, 500, 12]);

    let statements = connector.statements();
    assert_eq!(statements[0].args, vec![Value::Unsigned(2)]);
    let insert = statements.last().unwrap();
    assert_eq!(insert.target, SHARD1_W);
    assert!(insert.sql.ends_with("VALUES (?, ?, ?, ?), (?, ?, ?, ?), (?, ?, ?, ?)"));
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_create_multi_rejects_mixed_shards_before_any_sql() {
    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(2)).unwrap();
    coordinator.shards().remember(&Value::from(78u64), shard(1)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut batch = vec![item(0, 77, 1), item(0, 78, 1)];
    let err = items.create_multi(&mut ctx, &mut batch).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidOption(_)));
    assert!(batch.iter().all(|i| i.id == 0));

    ctx.rollback().await.unwrap();
    assert!(connector.events().is_empty());

    let mut empty: Vec<UserItem> = Vec::new();
    assert!(items.create_multi(&mut ctx, &mut empty).await.is_err());
}

#[tokio::test]
async fn test_missing_sequence_row_is_not_configured() {
    let connector = MockConnector::new();
    FakeStore::new().install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let err = items.create(&mut ctx, &mut item(0, 77, 1)).await.unwrap_err();
    assert!(matches!(err, DbError::NotConfigured(_)));
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_find_populates_record() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    let stored = item(3, 77, 9);
    store.reply_rows("user_item", vec![item_row(&stored)]);
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(2)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut found = item(3, 77, 0);
    items.find(&mut ctx, &mut found, &Options::new()).await.unwrap();
    assert_eq!(found, stored);

    let select = &connector.statements()[0];
    assert_eq!(select.target, SHARD2_R);
    assert_eq!(
        select.sql,
        "SELECT id, user_id, item_id, count, created_at FROM user_item WHERE id = ?"
    );
    assert_eq!(select.args, vec![Value::Unsigned(3)]);
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_create_then_find_round_trip() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.seed_sequence("user_item", 40);
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut created = UserItem {
        item_id: 12,
        ..item(0, 77, 4)
    };
    items.create(&mut ctx, &mut created).await.unwrap();
    ctx.commit().await.unwrap();
    ctx.rollback().await.unwrap();
    assert_eq!(created.id, 41);
    assert!(store.stored("user_item", 41).is_some());

    let mut ctx = coordinator.begin_request().unwrap();
    let mut found = item(created.id, 77, 0);
    items.find(&mut ctx, &mut found, &Options::new()).await.unwrap();
    assert_eq!(found, created);
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_find_for_update_uses_write_shard() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.reply_rows("user_item", vec![item_row(&item(3, 77, 9))]);
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    items
        .find(&mut ctx, &mut item(3, 77, 0), &Options::new().for_update())
        .await
        .unwrap();

    let select = &connector.statements()[0];
    assert_eq!(select.target, SHARD1_W);
    assert!(select.sql.ends_with("WHERE id = ? FOR UPDATE"));
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_find_missing_row_is_not_found() {
    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let err = items
        .find(&mut ctx, &mut item(3, 77, 0), &Options::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_unsharded_table_uses_master() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.reply_rows(
        "user",
        vec![Row::from_pairs([("id", Value::Unsigned(1)), ("name", Value::from("mika"))])],
    );
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    connector.clear();

    let users = RecordExecutor::<User>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut user = User { id: 1, name: String::new(), dirty: true };
    // Shard options are ignored for master tables.
    users
        .find(&mut ctx, &mut user, &Options::new().shard_id(2))
        .await
        .unwrap();
    assert_eq!(user.name, "mika");
    assert!(!user.dirty);
    assert_eq!(connector.statements()[0].target, MASTER_R);
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_finds_and_count_with_condition() {
    let connector = MockConnector::new();
    let store = FakeStore::new();
    store.reply_rows(
        "user_item",
        vec![item_row(&item(1, 77, 1)), item_row(&item(2, 77, 2))],
    );
    store.install(&connector);
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(2)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let condition = Condition::new()
        .filter(Predicate::equals("user_id", 77u64))
        .filter(Predicate::in_list("item_id", [5u32, 6, 7]))
        .order(OrderBy::desc("id"));
    let mut ctx = coordinator.begin_request().unwrap();

    let found = items
        .finds(&mut ctx, &condition, &Options::new().shard_key(77u64))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[1].count, 2);

    let select = &connector.statements()[0];
    assert_eq!(select.target, SHARD2_R);
    assert_eq!(
        select.sql,
        "SELECT id, user_id, item_id, count, created_at FROM user_item \
         WHERE user_id = ? AND item_id IN (?, ?, ?) ORDER BY id DESC"
    );
    assert_eq!(select.args.len(), 4);

    let total = items
        .count(&mut ctx, &condition, &Options::new().shard_id(2))
        .await
        .unwrap();
    // Canned rows answer every SELECT on the table; the first cell is read.
    assert_eq!(total, 1);
    assert!(connector.statements()[1].sql.starts_with("SELECT COUNT(1) FROM user_item WHERE"));
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_finds_on_sharded_table_needs_a_route() {
    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();

    let err = items
        .finds(&mut ctx, &Condition::new(), &Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOption(_)));

    let err = items
        .finds(&mut ctx, &Condition::new(), &Options::new().shard_id(1).shard_key(77u64))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOption(_)));

    let err = items
        .count(&mut ctx, &Condition::new(), &Options::new().shard_id(3))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOption(_)));
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_update_writes_changed_columns_only() {
    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(1)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let before = item(3, 77, 1);
    let mut after = before.clone();
    after.count = 4;

    assert_eq!(items.update(&mut ctx, &before, Some(&before.clone())).await.unwrap(), 0);
    assert!(connector.events().is_empty());

    assert_eq!(items.update(&mut ctx, &after, Some(&before)).await.unwrap(), 1);
    let update = &connector.statements()[0];
    assert_eq!(update.target, SHARD1_W);
    assert_eq!(update.sql, "UPDATE user_item SET count = ? WHERE id = ?");
    assert_eq!(update.args, vec![Value::Integer(4), Value::Unsigned(3)]);

    connector.clear();
    items.update(&mut ctx, &after, None).await.unwrap();
    assert_eq!(
        connector.statements()[0].sql,
        "UPDATE user_item SET user_id = ?, item_id = ?, count = ? WHERE id = ?"
    );
    ctx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_delete_and_save() {
    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    coordinator.shards().remember(&Value::from(77u64), shard(2)).unwrap();
    connector.clear();

    let items = RecordExecutor::<UserItem>::new();
    let mut ctx = coordinator.begin_request().unwrap();
    let mut existing = item(3, 77, 1);

    assert_eq!(items.delete(&mut ctx, &existing).await.unwrap(), 1);
    items.save(&mut ctx, &mut existing).await.unwrap();

    let statements = connector.statements();
    assert_eq!(statements[0].sql, "DELETE FROM user_item WHERE id = ?");
    assert_eq!(statements[0].target, SHARD2_W);
    assert_eq!(
        statements[1].sql,
        "INSERT INTO user_item (id, user_id, item_id, count) VALUES (?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE user_id = ?, item_id = ?, count = ?"
    );
    assert_eq!(statements[1].args.len(), 7);
    ctx.rollback().await.unwrap();
    assert!(labels_of(&connector, "commit").is_empty());
}

#[tokio::test]
async fn test_unknown_table_is_not_configured() {
    #[derive(Record, Debug, Clone, PartialEq)]
    #[record(table = "guild")]
    struct Guild {
        #[sql(pk)]
        id: u64,
    }

    let connector = MockConnector::new();
    let coordinator = game_coordinator(&connector).await;
    let mut ctx = coordinator.begin_request().unwrap();
    let err = RecordExecutor::<Guild>::new()
        .delete(&mut ctx, &Guild { id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotConfigured(_)));
    ctx.rollback().await.unwrap();
}
