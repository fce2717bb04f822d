use indexmap::IndexMap;
use tarantool_sql::{
    Connection, FieldDefinition, HttpGateway, Row, ScalarField, Statement, TarantoolConnection,
    Value,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut conn = TarantoolConnection::http(HttpGateway::from_env().map_err(anyhow::Error::msg)?);

    let mut fields: IndexMap<String, FieldDefinition> = IndexMap::new();
    fields.insert(
        "ID".to_owned(),
        ScalarField::new("ID", "integer")
            .primary_key()
            .auto_increment()
            .into(),
    );
    fields.insert(
        "NAME".to_owned(),
        ScalarField::new("NAME", "text").not_null().into(),
    );

    if !conn.table_exists("users").await? {
        conn.create_table("users", &fields, &["ID"], &["ID"]).await?;
    }

    let mut row = Row::new();
    row.insert("NAME".to_owned(), Value::text("Kit"));
    let inserted = conn.insert("users", row).await?;
    println!("inserted id: {:?}", inserted.inserted_id);

    let mut cursor = conn
        .query(Statement::new(
            "SELECT ID, NAME FROM \"users\" WHERE NAME = ?",
            vec![Value::text("Kit")],
        ))
        .await?;
    while let Some(row) = cursor.fetch()? {
        println!("{row:?}");
    }

    conn.disconnect().await;
    Ok(())
}
