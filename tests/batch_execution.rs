// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{object, RecordingConnection};
use fabricsql_node::engine::batch::{QueueOptions, RowDescriptor, TableGroups};
use fabricsql_node::engine::error::{EngineError, EngineResult};
use fabricsql_node::engine::operations::{delete_operation, insert_operation, update_operation};
use fabricsql_node::engine::traits::SqlConnection;
use fabricsql_node::engine::types::{InputItem, PairedItem, Value};
use fabricsql_node::node::expression::JsonPathResolver;
use fabricsql_node::node::{self, NodeOptions, NodeParameters, Operation};
use serde_json::json;

fn items(records: Vec<serde_json::Value>) -> Vec<InputItem> {
    InputItem::from_records(records.into_iter().map(object).collect())
}

fn params(table: &str, columns: &str) -> NodeParameters {
    NodeParameters {
        table: table.to_string(),
        columns: columns.to_string(),
        ..NodeParameters::default()
    }
}

async fn connected(conn: &mut RecordingConnection) -> EngineResult<()> {
    conn.connect().await
}

#[tokio::test]
async fn same_group_inserts_become_one_statement() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    connected(&mut conn).await?;

    let input = items(vec![
        json!({ "id": 1, "name": "Ann" }),
        json!({ "id": 2, "name": "Bob" }),
        json!({ "id": 3, "name": "Cy" }),
    ]);
    let descriptors = vec![RowDescriptor::insert("users", "id,name"); 3];
    let groups = TableGroups::build(&input, &descriptors)?;

    let outcomes = insert_operation(&conn, &groups, QueueOptions::default()).await?;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].origins, vec![0, 1, 2]);

    let executed = conn.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].sql,
        "INSERT INTO [users] ([id], [name]) VALUES (@r0v0, @r0v1), (@r1v0, @r1v1), (@r2v0, @r2v1);"
    );
    assert_eq!(executed[0].params.len(), 6);
    assert_eq!(executed[0].params[5], ("r2v1".to_string(), Value::Text("Cy".into())));
    Ok(())
}

#[tokio::test]
async fn column_order_and_spacing_decide_grouping() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    connected(&mut conn).await?;

    let input = items(vec![
        json!({ "a": 1, "b": 2 }),
        json!({ "a": 3, "b": 4 }),
        json!({ "a": 5, "b": 6 }),
    ]);
    let descriptors = vec![
        RowDescriptor::insert("t", "a,b"),
        RowDescriptor::insert("t", "a, b"),
        RowDescriptor::insert("t", "b,a"),
    ];
    let groups = TableGroups::build(&input, &descriptors)?;
    insert_operation(&conn, &groups, QueueOptions::default()).await?;

    let mut statements = conn.statements();
    statements.sort();
    assert_eq!(
        statements,
        vec![
            "INSERT INTO [t] ([a], [b]) VALUES (@r0v0, @r0v1), (@r1v0, @r1v1);".to_string(),
            "INSERT INTO [t] ([b], [a]) VALUES (@r0v0, @r0v1);".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn wide_inserts_are_split_below_parameter_limit() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    connected(&mut conn).await?;

    let input = items((0..3000).map(|i| json!({ "id": i, "name": "x" })).collect());
    let descriptors = vec![RowDescriptor::insert("users", "id,name"); input.len()];
    let groups = TableGroups::build(&input, &descriptors)?;
    insert_operation(&conn, &groups, QueueOptions::default()).await?;

    let executed = conn.executed();
    let counts: Vec<usize> = executed.iter().map(|e| e.params.len()).collect();
    assert!(counts.iter().all(|c| *c < 2100));
    assert_eq!(counts.iter().sum::<usize>(), 6000);
    assert_eq!(executed.len(), 3);
    Ok(())
}

#[tokio::test]
async fn updates_run_once_per_row_with_their_own_key() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    connected(&mut conn).await?;

    let input = items(vec![
        json!({ "id": 1, "email": "a@x", "name": "Ann" }),
        json!({ "id": 2, "email": "b@x", "name": "Bob" }),
    ]);
    let descriptors = vec![
        RowDescriptor::update("users", "name", "id"),
        RowDescriptor::update("users", "name", "email"),
    ];
    let groups = TableGroups::build(&input, &descriptors)?;
    update_operation(&conn, &groups, QueueOptions::default()).await?;

    let mut executed = conn.executed();
    executed.sort_by(|a, b| a.sql.cmp(&b.sql));
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].sql, "UPDATE [users] SET [name] = @v0 WHERE email = @condition;");
    assert_eq!(executed[0].params[0], ("condition".to_string(), Value::Text("b@x".into())));
    assert_eq!(executed[1].sql, "UPDATE [users] SET [name] = @v0 WHERE id = @condition;");
    assert_eq!(executed[1].params[0], ("condition".to_string(), Value::Int(1)));
    Ok(())
}

#[tokio::test]
async fn delete_sums_rows_across_tables() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    connected(&mut conn).await?;

    let mut records: Vec<serde_json::Value> = (0..1500).map(|i| json!({ "id": i })).collect();
    records.push(json!({ "id": 9 }));
    records.push(json!({ "id": 10 }));
    let input = items(records);

    let mut descriptors = vec![RowDescriptor::delete("orders", "id"); 1500];
    descriptors.push(RowDescriptor::delete("users", "id"));
    descriptors.push(RowDescriptor::delete("users", "id"));
    let groups = TableGroups::build(&input, &descriptors)?;

    let total = delete_operation(&conn, &groups, QueueOptions::default()).await?;
    assert_eq!(total, 1502);

    let statements = conn.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements.iter().filter(|s| s.starts_with("DELETE FROM [orders] WHERE [id] IN")).count(),
        2
    );
    assert!(statements.contains(&"DELETE FROM [users] WHERE [id] IN (@v0, @v1);".to_string()));
    Ok(())
}

#[tokio::test]
async fn one_failing_statement_fails_the_operation() -> EngineResult<()> {
    let mut conn = RecordingConnection::new().failing_on("[b]", "Invalid object name 'b'.");
    connected(&mut conn).await?;

    let input = items(vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })]);
    let descriptors = vec![
        RowDescriptor::delete("a", "id"),
        RowDescriptor::delete("b", "id"),
        RowDescriptor::delete("c", "id"),
    ];
    let groups = TableGroups::build(&input, &descriptors)?;

    let err = delete_operation(&conn, &groups, QueueOptions { max_concurrency: Some(1) })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid object name 'b'.");
    Ok(())
}

// ==================== Node level ====================

#[tokio::test]
async fn node_insert_echoes_items_and_closes() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    let input = items(vec![json!({ "id": 1, "name": "Ann" }), json!({ "id": 2, "name": "Bob" })]);
    let parameters = vec![params("users", "id,name"); 2];

    let output = node::execute(
        &mut conn,
        Operation::Insert,
        &input,
        &parameters,
        &NodeOptions::default(),
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(output.len(), 2);
    assert_eq!(output[1].json, input[1].json);
    assert_eq!(output[1].paired_item, vec![PairedItem { item: 1 }]);
    assert_eq!(conn.statements().len(), 1);
    assert_eq!(conn.connects(), 1);
    assert_eq!(conn.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn node_delete_reports_total_paired_with_every_input() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    let input = items(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
    let parameters = vec![params("users", ""); 2];

    let output = node::execute(
        &mut conn,
        Operation::Delete,
        &input,
        &parameters,
        &NodeOptions::default(),
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].json, object(json!({ "rowsAffected": 2 })));
    assert_eq!(output[0].paired_item, vec![PairedItem { item: 0 }, PairedItem { item: 1 }]);
    Ok(())
}

#[tokio::test]
async fn node_failure_closes_then_raises() {
    let mut conn = RecordingConnection::new().failing_on("INSERT", "Violation of PRIMARY KEY");
    let input = items(vec![json!({ "id": 1 })]);

    let err = node::execute(
        &mut conn,
        Operation::Insert,
        &input,
        &[params("users", "id")],
        &NodeOptions::default(),
        &JsonPathResolver,
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "Violation of PRIMARY KEY");
    assert_eq!(conn.closes(), 1);
}

#[tokio::test]
async fn node_failure_with_continue_on_fail_emits_error_item() -> EngineResult<()> {
    let mut conn = RecordingConnection::new().failing_on("INSERT", "Violation of PRIMARY KEY");
    let input = items(vec![json!({ "id": 1 }), json!({ "id": 1 })]);
    let options = NodeOptions {
        continue_on_fail: true,
        ..NodeOptions::default()
    };

    let output = node::execute(
        &mut conn,
        Operation::Insert,
        &input,
        &[params("users", "id"), params("users", "id")],
        &options,
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(output.len(), 1);
    assert_eq!(output[0].json, object(json!({ "error": "Violation of PRIMARY KEY" })));
    assert_eq!(output[0].paired_item.len(), 2);
    assert_eq!(conn.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn connect_failure_is_raised_or_recorded() {
    let input = items(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
    let parameters = vec![params("users", "id"); 2];

    let mut conn = RecordingConnection::failing_connect("Login failed for user 'sa'.");
    let err = node::execute(
        &mut conn,
        Operation::Insert,
        &input,
        &parameters,
        &NodeOptions::default(),
        &JsonPathResolver,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::ConnectionFailed { .. }));
    assert_eq!(conn.closes(), 1);
    assert!(conn.executed().is_empty());

    let mut conn = RecordingConnection::failing_connect("Login failed for user 'sa'.");
    let options = NodeOptions {
        continue_on_fail: true,
        ..NodeOptions::default()
    };
    let output = node::execute(
        &mut conn,
        Operation::Insert,
        &input,
        &parameters,
        &options,
        &JsonPathResolver,
    )
    .await
    .unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].json, object(json!({ "error": "Login failed for user 'sa'." })));
    assert_eq!(output[0].paired_item.len(), 2);
}

#[tokio::test]
async fn per_item_queries_resolve_placeholders() -> EngineResult<()> {
    let mut conn = RecordingConnection::new();
    let input = items(vec![json!({ "id": 7 }), json!({ "id": 8 })]);
    let query = NodeParameters {
        query: "DELETE FROM logs WHERE id = {{ $json.id }}".to_string(),
        ..NodeParameters::default()
    };

    let output = node::execute(
        &mut conn,
        Operation::ExecuteQuery,
        &input,
        &[query.clone(), query],
        &NodeOptions::default(),
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(
        conn.statements(),
        vec![
            "DELETE FROM logs WHERE id = 7".to_string(),
            "DELETE FROM logs WHERE id = 8".to_string(),
        ]
    );
    assert_eq!(output.len(), 2);
    assert_eq!(
        output[1].json,
        object(json!({ "message": "Query 1 executed successfully", "rowsAffected": 0 }))
    );
    assert_eq!(output[1].paired_item, vec![PairedItem { item: 1 }]);
    Ok(())
}

#[tokio::test]
async fn per_item_query_failure_is_recorded_against_its_item() -> EngineResult<()> {
    let mut conn = RecordingConnection::new()
        .failing_on("bad", "Incorrect syntax near 'bad'.")
        .with_rows(vec![vec![object(json!({ "n": 1 }))]]);
    let input = items(vec![json!({}), json!({})]);
    let options = NodeOptions {
        continue_on_fail: true,
        ..NodeOptions::default()
    };
    let parameters = vec![
        NodeParameters { query: "SELECT bad".to_string(), ..NodeParameters::default() },
        NodeParameters { query: "SELECT 1 AS n".to_string(), ..NodeParameters::default() },
    ];

    let output = node::execute(
        &mut conn,
        Operation::ExecuteQuery,
        &input,
        &parameters,
        &options,
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(output.len(), 2);
    assert_eq!(output[0].json, object(json!({ "error": "Incorrect syntax near 'bad'." })));
    assert_eq!(output[0].paired_item, vec![PairedItem { item: 0 }]);
    assert_eq!(output[1].json, object(json!({ "n": 1 })));
    assert_eq!(output[1].paired_item, vec![PairedItem { item: 1 }]);
    Ok(())
}

#[tokio::test]
async fn legacy_query_runs_once_and_pairs_with_all_inputs() -> EngineResult<()> {
    let mut conn = RecordingConnection::new().with_rows(vec![
        vec![object(json!({ "n": 1 }))],
        vec![object(json!({ "n": 2 }))],
    ]);
    let input = items(vec![json!({ "t": "a" }), json!({ "t": "b" })]);
    let parameters = vec![
        NodeParameters { query: "SELECT * FROM {{ $json.t }}".to_string(), ..NodeParameters::default() },
        NodeParameters { query: "SELECT * FROM {{ $json.t }}".to_string(), ..NodeParameters::default() },
    ];
    let options = NodeOptions {
        node_version: 1.0,
        ..NodeOptions::default()
    };

    let output = node::execute(
        &mut conn,
        Operation::ExecuteQuery,
        &input,
        &parameters,
        &options,
        &JsonPathResolver,
    )
    .await?;

    assert_eq!(conn.statements(), vec!["SELECT * FROM a".to_string()]);
    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|o| o.paired_item.len() == 2));
    Ok(())
}

#[tokio::test]
async fn connection_test_reports_status() {
    let mut ok = RecordingConnection::new();
    let result = node::test_connection(&mut ok).await;
    assert_eq!(result.status, node::ConnectionStatus::Ok);
    assert_eq!(ok.closes(), 1);

    let mut bad = RecordingConnection::failing_connect("Login failed for user 'sa'.");
    let result = node::test_connection(&mut bad).await;
    assert_eq!(result.status, node::ConnectionStatus::Error);
    assert_eq!(result.message, "Login failed for user 'sa'.");
}
