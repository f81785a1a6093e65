use axum_delivery_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dispatch::{MSG_CANCEL_FAILED, MSG_GRAB_FAILED, OrderStatus},
    dto::orders::{
        CancelOrderRequest, CreateOrderRequest, GrabOrderRequest, MerchantUpdateRequest,
        OrderItemInput, OrderWithItems, RiderHistoryQuery, RiderUpdateStatusRequest,
    },
    entity::{
        products::ActiveModel as ProductActive, stores::ActiveModel as StoreActive,
        users::ActiveModel as UserActive,
    },
    middleware::auth::AuthUser,
    models::Order,
    permission::Role,
    routes::params::Pagination,
    services::{customer_service, merchant_service, rider_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

// Every test builds its own users, store and orders with fresh uuids, so the
// suite can run in parallel against a shared database without truncation.

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(&database_url).await?;

    Ok(Some(AppState { pool, orm }))
}

async fn create_user(state: &AppState, role: Role) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    UserActive {
        id: Set(id),
        email: Set(format!("{}-{}@example.com", role.as_str(), id)),
        password_hash: Set("dummy".into()),
        role: Set(role.as_str().into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser { user_id: id, role })
}

async fn create_store(
    state: &AppState,
    merchant: &AuthUser,
    delivery_price: i64,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    StoreActive {
        id: Set(id),
        merchant_id: Set(merchant.user_id),
        name: Set(format!("Test Store {id}")),
        location: Set("1 Store Road".into()),
        delivery_price: Set(delivery_price),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(id)
}

async fn create_product(state: &AppState, store_id: Uuid, price: i64) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    ProductActive {
        id: Set(id),
        store_id: Set(store_id),
        name: Set(format!("Test Dish {id}")),
        price: Set(price),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(id)
}

async fn place_order(
    state: &AppState,
    customer: &AuthUser,
    store_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> anyhow::Result<OrderWithItems> {
    let resp = customer_service::create_order(
        state,
        customer,
        CreateOrderRequest {
            store_id,
            items: vec![OrderItemInput {
                product_id,
                quantity,
            }],
            user_location: "42 Customer Lane".into(),
            deadline: chrono::Utc::now() + chrono::Duration::minutes(45),
            remark: None,
        },
    )
    .await?;
    assert_eq!(resp.code, 200, "order creation failed: {:?}", resp.message);
    Ok(resp.data.unwrap())
}

async fn confirm_order(
    state: &AppState,
    merchant: &AuthUser,
    order_id: Uuid,
) -> anyhow::Result<Order> {
    let resp = merchant_service::update_order(
        state,
        merchant,
        MerchantUpdateRequest {
            id: order_id,
            new_status: "confirmed".into(),
            cancel_reason: None,
        },
    )
    .await?;
    assert_eq!(resp.code, 200, "confirm failed: {:?}", resp.message);
    Ok(resp.data.unwrap())
}

async fn advance(
    state: &AppState,
    rider: &AuthUser,
    order_id: Uuid,
    target: OrderStatus,
) -> anyhow::Result<axum_delivery_api::response::ApiResponse<Order>> {
    Ok(rider_service::update_status(
        state,
        rider,
        RiderUpdateStatusRequest {
            order_id,
            target_status: target.as_str().into(),
        },
    )
    .await?)
}

async fn feed_contains(state: &AppState, rider: &AuthUser, order_id: Uuid) -> anyhow::Result<bool> {
    let mut page = 1;
    loop {
        let resp = rider_service::list_available(
            state,
            rider,
            Pagination {
                page: Some(page),
                page_size: Some(100),
            },
        )
        .await?;
        let list = resp.data.unwrap();
        if list.items.iter().any(|o| o.id == order_id) {
            return Ok(true);
        }
        if list.items.is_empty() || page * 100 >= list.total {
            return Ok(false);
        }
        page += 1;
    }
}

#[tokio::test]
async fn full_dispatch_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;

    let store_id = create_store(&state, &merchant, 500).await?;
    let product_id = create_product(&state, store_id, 2000).await?;

    let created = place_order(&state, &customer, store_id, product_id, 2).await?;
    let order = created.order;
    assert_eq!(order.status, OrderStatus::Available);
    assert!(!order.confirmed);
    assert_eq!(order.rider_id, None);
    assert_eq!(order.total_price, 4000);
    assert_eq!(order.delivery_price, 500);
    assert_eq!(order.actual_price, 4500);
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].quantity, 2);

    // Unconfirmed orders are invisible to riders and cannot be grabbed.
    assert!(!feed_contains(&state, &rider, order.id).await?);
    let early_grab = rider_service::grab_order(
        &state,
        &rider,
        GrabOrderRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(early_grab.code, 409);
    assert_eq!(early_grab.message.as_deref(), Some(MSG_GRAB_FAILED));

    let confirmed = confirm_order(&state, &merchant, order.id).await?;
    assert!(confirmed.confirmed);
    assert_eq!(confirmed.status, OrderStatus::Available);
    assert!(feed_contains(&state, &rider, order.id).await?);

    let grabbed = rider_service::grab_order(
        &state,
        &rider,
        GrabOrderRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(grabbed.code, 200);
    let grabbed = grabbed.data.unwrap();
    assert_eq!(grabbed.status, OrderStatus::Assigned);
    assert_eq!(grabbed.rider_id, Some(rider.user_id));

    for target in [
        OrderStatus::PickedUp,
        OrderStatus::Delivering,
        OrderStatus::Completed,
    ] {
        let resp = advance(&state, &rider, order.id, target).await?;
        assert_eq!(resp.code, 200, "advance to {target} failed: {:?}", resp.message);
        assert_eq!(resp.data.unwrap().status, target);
    }

    let history = rider_service::history(
        &state,
        &rider,
        RiderHistoryQuery {
            status: Some("completed".into()),
            ..Default::default()
        },
    )
    .await?;
    let history = history.data.unwrap();
    assert_eq!(history.total, 1);
    let done = &history.items[0];
    assert_eq!(done.status, OrderStatus::Completed);
    assert!(done.ended_at.is_some());
    assert_eq!(done.actual_price, 4500);

    let earnings = rider_service::earnings(&state, &rider).await?.data.unwrap();
    assert_eq!(earnings.total_earnings, 500);
    assert_eq!(earnings.completed_orders, 1);
    assert_eq!(earnings.today_earnings, 500);
    assert_eq!(earnings.today_completed, 1);

    // Read-only views for the other two actors.
    let mine = customer_service::history(&state, &customer, Pagination::default()).await?;
    assert_eq!(mine.data.unwrap().total, 1);
    let store_orders = merchant_service::list_orders(&state, &merchant, Pagination::default()).await?;
    assert_eq!(store_orders.data.unwrap().total, 1);

    Ok(())
}

#[tokio::test]
async fn concurrent_grab_assigns_at_most_once() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let store_id = create_store(&state, &merchant, 300).await?;
    let product_id = create_product(&state, store_id, 1500).await?;

    let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    confirm_order(&state, &merchant, order.id).await?;

    let mut riders = Vec::new();
    for _ in 0..8 {
        riders.push(create_user(&state, Role::Rider).await?);
    }

    let mut handles = Vec::new();
    for rider in riders {
        let state = state.clone();
        let order_id = order.id;
        handles.push(tokio::spawn(async move {
            let resp = rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id })
                .await
                .map_err(anyhow::Error::from)?;
            Ok::<_, anyhow::Error>((rider.user_id, resp))
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (rider_id, resp) = handle.await??;
        if resp.code == 200 {
            winners.push((rider_id, resp.data.unwrap()));
        } else {
            assert_eq!(resp.code, 409);
            assert_eq!(resp.message.as_deref(), Some(MSG_GRAB_FAILED));
        }
    }

    assert_eq!(winners.len(), 1, "exactly one grab must win");
    let (winner_id, won) = &winners[0];
    assert_eq!(won.status, OrderStatus::Assigned);
    assert_eq!(won.rider_id, Some(*winner_id));

    Ok(())
}

#[tokio::test]
async fn merchant_cancel_blocks_later_grabs() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;
    let store_id = create_store(&state, &merchant, 400).await?;
    let product_id = create_product(&state, store_id, 1200).await?;

    let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    confirm_order(&state, &merchant, order.id).await?;

    let cancelled = merchant_service::update_order(
        &state,
        &merchant,
        MerchantUpdateRequest {
            id: order.id,
            new_status: "cancelled".into(),
            cancel_reason: Some("商品缺货".into()),
        },
    )
    .await?;
    assert_eq!(cancelled.code, 200);
    let cancelled = cancelled.data.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("商品缺货"));
    assert!(cancelled.ended_at.is_some());

    let grab = rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id: order.id })
        .await?;
    assert_eq!(grab.code, 409);
    assert_eq!(grab.message.as_deref(), Some(MSG_GRAB_FAILED));

    // Cancelling an assigned order releases the rider as well.
    let order2 = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    confirm_order(&state, &merchant, order2.id).await?;
    let grabbed = rider_service::grab_order(
        &state,
        &rider,
        GrabOrderRequest { order_id: order2.id },
    )
    .await?;
    assert_eq!(grabbed.code, 200);

    let cancelled2 = merchant_service::update_order(
        &state,
        &merchant,
        MerchantUpdateRequest {
            id: order2.id,
            new_status: "cancelled".into(),
            cancel_reason: Some("店铺打烊".into()),
        },
    )
    .await?;
    assert_eq!(cancelled2.code, 200);
    let cancelled2 = cancelled2.data.unwrap();
    assert_eq!(cancelled2.status, OrderStatus::Cancelled);
    assert_eq!(cancelled2.rider_id, None);

    Ok(())
}

#[tokio::test]
async fn advance_requires_holder_and_strict_order() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;
    let other_rider = create_user(&state, Role::Rider).await?;
    let store_id = create_store(&state, &merchant, 350).await?;
    let product_id = create_product(&state, store_id, 900).await?;

    let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    confirm_order(&state, &merchant, order.id).await?;
    let grabbed = rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id: order.id })
        .await?;
    assert_eq!(grabbed.code, 200);

    // Skipping picked_up is rejected.
    let skip = advance(&state, &rider, order.id, OrderStatus::Delivering).await?;
    assert_eq!(skip.code, 409);

    // Only the holder may advance.
    let foreign = advance(&state, &other_rider, order.id, OrderStatus::PickedUp).await?;
    assert_eq!(foreign.code, 409);

    // Backward and sideways targets are never reachable by riders.
    let backward = advance(&state, &rider, order.id, OrderStatus::Available).await?;
    assert_eq!(backward.code, 409);

    // Unknown status strings are malformed input, not transitions.
    let garbage = rider_service::update_status(
        &state,
        &rider,
        RiderUpdateStatusRequest {
            order_id: order.id,
            target_status: "flying".into(),
        },
    )
    .await?;
    assert_eq!(garbage.code, 400);

    let ok = advance(&state, &rider, order.id, OrderStatus::PickedUp).await?;
    assert_eq!(ok.code, 200);

    Ok(())
}

#[tokio::test]
async fn rider_cancel_releases_the_order() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;
    let second_rider = create_user(&state, Role::Rider).await?;
    let store_id = create_store(&state, &merchant, 250).await?;
    let product_id = create_product(&state, store_id, 1100).await?;

    let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    confirm_order(&state, &merchant, order.id).await?;
    let grabbed = rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id: order.id })
        .await?;
    assert_eq!(grabbed.code, 200);

    let released = rider_service::cancel_order(
        &state,
        &rider,
        CancelOrderRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(released.code, 200);
    let released = released.data.unwrap();
    assert_eq!(released.status, OrderStatus::Available);
    assert_eq!(released.rider_id, None);

    // Second cancel finds nothing to release.
    let again = rider_service::cancel_order(
        &state,
        &rider,
        CancelOrderRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(again.code, 409);
    assert_eq!(again.message.as_deref(), Some(MSG_CANCEL_FAILED));

    // The released order is grabbable by someone else.
    let regrab = rider_service::grab_order(
        &state,
        &second_rider,
        GrabOrderRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(regrab.code, 200);
    assert_eq!(regrab.data.unwrap().rider_id, Some(second_rider.user_id));

    Ok(())
}

#[tokio::test]
async fn earnings_count_only_completed_orders() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;
    let cheap_store = create_store(&state, &merchant, 300).await?;
    let pricey_store = create_store(&state, &merchant, 800).await?;
    let cheap_dish = create_product(&state, cheap_store, 1000).await?;
    let pricey_dish = create_product(&state, pricey_store, 3000).await?;

    for (store_id, product_id) in [(cheap_store, cheap_dish), (pricey_store, pricey_dish)] {
        let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
        confirm_order(&state, &merchant, order.id).await?;
        let grabbed =
            rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id: order.id })
                .await?;
        assert_eq!(grabbed.code, 200);
        for target in [
            OrderStatus::PickedUp,
            OrderStatus::Delivering,
            OrderStatus::Completed,
        ] {
            assert_eq!(advance(&state, &rider, order.id, target).await?.code, 200);
        }
    }

    // A cancelled order must never contribute.
    let doomed = place_order(&state, &customer, cheap_store, cheap_dish, 1).await?.order;
    confirm_order(&state, &merchant, doomed.id).await?;
    let grabbed = rider_service::grab_order(&state, &rider, GrabOrderRequest { order_id: doomed.id })
        .await?;
    assert_eq!(grabbed.code, 200);
    let cancelled = merchant_service::update_order(
        &state,
        &merchant,
        MerchantUpdateRequest {
            id: doomed.id,
            new_status: "cancelled".into(),
            cancel_reason: Some("商品缺货".into()),
        },
    )
    .await?;
    assert_eq!(cancelled.code, 200);

    let earnings = rider_service::earnings(&state, &rider).await?.data.unwrap();
    assert_eq!(earnings.total_earnings, 1100);
    assert_eq!(earnings.completed_orders, 2);

    Ok(())
}

#[tokio::test]
async fn roles_are_isolated_per_operation() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let rider = create_user(&state, Role::Rider).await?;

    let grab = rider_service::grab_order(
        &state,
        &customer,
        GrabOrderRequest {
            order_id: Uuid::new_v4(),
        },
    )
    .await?;
    assert_eq!(grab.code, 403);
    assert_eq!(grab.message.as_deref(), Some("无权限访问，仅骑手可操作"));

    let earnings = rider_service::earnings(&state, &merchant).await?;
    assert_eq!(earnings.code, 403);

    let update = merchant_service::update_order(
        &state,
        &rider,
        MerchantUpdateRequest {
            id: Uuid::new_v4(),
            new_status: "confirmed".into(),
            cancel_reason: None,
        },
    )
    .await?;
    assert_eq!(update.code, 403);

    let create = customer_service::create_order(
        &state,
        &rider,
        CreateOrderRequest {
            store_id: Uuid::new_v4(),
            items: vec![],
            user_location: "nowhere".into(),
            deadline: chrono::Utc::now(),
            remark: None,
        },
    )
    .await?;
    assert_eq!(create.code, 403);

    Ok(())
}

#[tokio::test]
async fn create_order_rejects_bad_input_and_foreign_merchants_cannot_touch() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let customer = create_user(&state, Role::Customer).await?;
    let merchant = create_user(&state, Role::Merchant).await?;
    let other_merchant = create_user(&state, Role::Merchant).await?;
    let store_id = create_store(&state, &merchant, 200).await?;
    let other_store = create_store(&state, &other_merchant, 200).await?;
    let product_id = create_product(&state, store_id, 1000).await?;
    let foreign_product = create_product(&state, other_store, 1000).await?;

    let deadline = chrono::Utc::now() + chrono::Duration::minutes(30);

    let empty = customer_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            store_id,
            items: vec![],
            user_location: "42 Customer Lane".into(),
            deadline,
            remark: None,
        },
    )
    .await?;
    assert_eq!(empty.code, 400);

    let zero_qty = customer_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            store_id,
            items: vec![OrderItemInput {
                product_id,
                quantity: 0,
            }],
            user_location: "42 Customer Lane".into(),
            deadline,
            remark: None,
        },
    )
    .await?;
    assert_eq!(zero_qty.code, 400);

    let unknown_store = customer_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            store_id: Uuid::new_v4(),
            items: vec![OrderItemInput {
                product_id,
                quantity: 1,
            }],
            user_location: "42 Customer Lane".into(),
            deadline,
            remark: None,
        },
    )
    .await?;
    assert_eq!(unknown_store.code, 404);

    let wrong_menu = customer_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            store_id,
            items: vec![OrderItemInput {
                product_id: foreign_product,
                quantity: 1,
            }],
            user_location: "42 Customer Lane".into(),
            deadline,
            remark: None,
        },
    )
    .await?;
    assert_eq!(wrong_menu.code, 400);

    // A merchant who does not own the store cannot confirm its orders.
    let order = place_order(&state, &customer, store_id, product_id, 1).await?.order;
    let foreign_confirm = merchant_service::update_order(
        &state,
        &other_merchant,
        MerchantUpdateRequest {
            id: order.id,
            new_status: "confirmed".into(),
            cancel_reason: None,
        },
    )
    .await?;
    assert_eq!(foreign_confirm.code, 404);

    Ok(())
}
