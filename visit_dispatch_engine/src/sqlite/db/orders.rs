use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::OrderFlowError,
};

/// Inserts a new order into the database using the given connection. This is not atomic on its
/// own; embed the call in a transaction and pass `&mut *tx` if you need atomicity with other
/// writes.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderFlowError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                client_id,
                service_type,
                city,
                district,
                address,
                scheduled_at,
                price,
                comment
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.client_id)
    .bind(order.service_type)
    .bind(order.city)
    .bind(order.district)
    .bind(order.address)
    .bind(order.scheduled_at)
    .bind(order.price)
    .bind(order.comment)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

/// Returns the order for the corresponding `order_id`, if any.
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The accept race, settled in one statement.
///
/// The row is claimed if and only if it is still `New` with no medic bound; concurrent callers
/// serialize on the row write, so exactly one of them gets the `RETURNING` row back and every
/// other caller gets `None`.
pub async fn try_accept_order(
    order_id: &OrderId,
    worker_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Accepted',
                medic_id = $2,
                accepted_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'New' AND medic_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(worker_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Moves the order from `from` to `to` as a guarded update. Returns `None` when the order is
/// missing or no longer in `from` — the caller decides which of the two it was.
pub async fn transition_status(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let extra = match to {
        OrderStatusType::Confirmed => ", confirmed_by_client = 1",
        OrderStatusType::Completed => ", completed_at = CURRENT_TIMESTAMP",
        _ => "",
    };
    let sql = format!(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP{extra} WHERE order_id = $2 AND status = $3 \
         RETURNING *"
    );
    let order: Option<Order> = sqlx::query_as(&sql)
        .bind(to.to_string())
        .bind(order_id.as_str())
        .bind(from.to_string())
        .fetch_optional(conn)
        .await?;
    trace!("📝️ Transition {order_id} {from} -> {to}: {}", if order.is_some() { "applied" } else { "skipped" });
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(client_id) = query.client_id {
        where_clause.push("client_id = ");
        where_clause.push_bind_unseparated(client_id);
    }
    if let Some(medic_id) = query.medic_id {
        where_clause.push("medic_id = ");
        where_clause.push_bind_unseparated(medic_id);
    }
    if let Some(city) = query.city {
        where_clause.push("city = ");
        where_clause.push_bind_unseparated(city);
    }
    if let Some(district) = query.district {
        where_clause.push("district = ");
        where_clause.push_bind_unseparated(district);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// The `New` orders an approved worker could accept right now, based on their directory record.
pub async fn available_orders_for_worker(
    worker_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"
        SELECT orders.*
        FROM orders
            JOIN worker_profiles ON worker_profiles.worker_id = $1 AND worker_profiles.city = orders.city
            JOIN worker_districts ON worker_districts.worker_id = $1 AND worker_districts.district = orders.district
        WHERE orders.status = 'New' AND worker_profiles.approved = 1
        ORDER BY orders.created_at ASC"#,
    )
    .bind(worker_id)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
