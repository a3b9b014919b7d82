#![cfg(feature = "test_e2e")]

#[tokio::test]
async fn create_query_delete_table() {
    let (client, database) = setup::create_kusto_client();

    let query = ".set KustoRsTest <| let text=\"Hello, World!\"; print str=text";
    let response = client
        .execute_command(database.clone(), query)
        .await
        .expect("Failed to run command");

    assert_eq!(response.table_count(), 1);

    let query = "KustoRsTest | take 1";
    let response = client
        .execute_query(database.clone(), query)
        .await
        .expect("Failed to run query");

    let results = response.into_primary_results().collect::<Vec<_>>();
    assert_eq!(results[0].rows.len(), 1);

    let query = ".drop table KustoRsTest ifexists";
    client
        .execute_command(database.clone(), query)
        .await
        .expect("Failed to run command");
}

#[tokio::test]
async fn streaming_query() {
    let (client, database) = setup::create_kusto_client();

    let mut rows = client
        .iter_query(database, "print x=1, s=\"hello\"")
        .await
        .expect("Failed to start query");

    let row = rows
        .next()
        .await
        .expect("expected one row")
        .expect("row should decode");
    assert_eq!(row.get("x").unwrap().as_i64(), Some(&1));
    assert!(rows.next().await.is_none());
}
