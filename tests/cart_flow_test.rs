mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{auth::Caller, entities::CartStatus, errors::ServiceError};

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn anonymous_caller_is_rejected() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .cart
        .add_item(&Caller::anonymous(), 1, 1)
        .await;
    assert_matches!(result, Err(ServiceError::AuthenticationRequired));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn unknown_user_is_distinguished_from_unauthenticated() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .cart
        .add_item(&Caller::authenticated(9_999), 1, 1)
        .await;
    assert_matches!(result, Err(ServiceError::CallerNotFound(_)));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn user_without_roles_is_rejected() {
    let app = TestApp::new().await;
    let caller = app.seed_user_without_roles("noroles@example.com").await;

    let result = app.state.services.cart.add_item(&caller, 1, 1).await;
    assert_matches!(result, Err(ServiceError::CallerHasNoRoles));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn non_buyer_cannot_operate_on_carts() {
    let app = TestApp::new().await;
    let caller = app.seed_non_buyer("admin@example.com").await;

    let result = app.state.services.cart.add_item(&caller, 1, 1).await;
    assert_matches!(result, Err(ServiceError::CallerNotBuyer));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn add_item_creates_the_cart_lazily() {
    let app = TestApp::new().await;
    let (caller, user_role_id) = app.seed_buyer("buyer@example.com").await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    assert!(app
        .state
        .services
        .cart
        .find_active(user_role_id)
        .await
        .unwrap()
        .is_none());

    let line = app
        .state
        .services
        .cart
        .add_item(&caller, product_id, 2)
        .await
        .expect("add_item failed");
    assert_eq!(line.quantity, 2);

    let cart = app
        .state
        .services
        .cart
        .find_active(user_role_id)
        .await
        .unwrap()
        .expect("cart should exist after first add");
    assert_eq!(cart.status, CartStatus::Active);
    assert_eq!(cart.user_role_id, user_role_id);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn re_adding_a_product_overwrites_the_quantity() {
    let app = TestApp::new().await;
    let (caller, user_role_id) = app.seed_buyer("merge@example.com").await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    app.state
        .services
        .cart
        .add_item(&caller, product_id, 3)
        .await
        .unwrap();
    app.state
        .services
        .cart
        .add_item(&caller, product_id, 5)
        .await
        .unwrap();

    let cart = app
        .state
        .services
        .cart
        .find_active(user_role_id)
        .await
        .unwrap()
        .unwrap();
    let lines = app.state.services.cart.lines_of(cart.id).await.unwrap();

    // One line, quantity overwritten: 5, not 8, not two lines
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 5);
    assert_eq!(lines[0].product_id, product_id);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn add_item_rejects_quantity_below_one() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("qty@example.com").await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    assert_matches!(
        app.state.services.cart.add_item(&caller, product_id, 0).await,
        Err(ServiceError::InvalidQuantity(_))
    );
    assert_matches!(
        app.state
            .services
            .cart
            .add_item(&caller, product_id, -2)
            .await,
        Err(ServiceError::InvalidQuantity(_))
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn add_item_rejects_unknown_and_inactive_products() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("catalog@example.com").await;

    assert_matches!(
        app.state.services.cart.add_item(&caller, 4_242, 1).await,
        Err(ServiceError::UnknownProduct(4_242))
    );

    let retired = app.seed_inactive_product("retired", dec!(5.00)).await;
    assert_matches!(
        app.state.services.cart.add_item(&caller, retired, 1).await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn add_item_never_consults_the_stock_ledger() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("scarce@example.com").await;
    let product_id = app.seed_product("rare", dec!(99.00), dec!(0.00)).await;
    app.set_stock(product_id, 1).await;

    // Stock is enforced at payment time only; adding 50 of a scarce item
    // must succeed.
    let line = app
        .state
        .services
        .cart
        .add_item(&caller, product_id, 50)
        .await
        .expect("reservation-free add should not fail");
    assert_eq!(line.quantity, 50);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn summarize_computes_derived_totals() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("totals@example.com").await;
    let product_id = app.seed_product("widget", dec!(100.00), dec!(19.00)).await;

    app.state
        .services
        .cart
        .add_item(&caller, product_id, 2)
        .await
        .unwrap();

    let summary = app.state.services.cart.summarize(&caller).await.unwrap();
    assert_eq!(summary.lines.len(), 1);
    assert_eq!(summary.total_items, 2);
    assert_eq!(summary.total_subtotal, dec!(200.00));
    assert_eq!(summary.total_tax, dec!(38.00));
    assert_eq!(summary.total_price, dec!(238.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn summarize_of_empty_cart_is_zero_not_an_error() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("empty@example.com").await;

    let summary = app.state.services.cart.summarize(&caller).await.unwrap();
    assert!(summary.lines.is_empty());
    assert_eq!(summary.total_items, 0);
    assert_eq!(summary.total_price, dec!(0));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn remove_item_deletes_own_line() {
    let app = TestApp::new().await;
    let (caller, user_role_id) = app.seed_buyer("remove@example.com").await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    let line = app
        .state
        .services
        .cart
        .add_item(&caller, product_id, 1)
        .await
        .unwrap();
    app.state
        .services
        .cart
        .remove_item(&caller, line.id)
        .await
        .expect("removing own line should succeed");

    let cart = app
        .state
        .services
        .cart
        .find_active(user_role_id)
        .await
        .unwrap()
        .unwrap();
    assert!(app
        .state
        .services
        .cart
        .lines_of(cart.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn removing_another_callers_line_is_unauthorized() {
    let app = TestApp::new().await;
    let (owner, owner_role_id) = app.seed_buyer("owner@example.com").await;
    let (intruder, _) = app.seed_buyer("intruder@example.com").await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    let line = app
        .state
        .services
        .cart
        .add_item(&owner, product_id, 1)
        .await
        .unwrap();

    let result = app.state.services.cart.remove_item(&intruder, line.id).await;
    assert_matches!(result, Err(ServiceError::CartItemUnauthorized));

    // A probe for a line that does not exist at all reads identically.
    let result = app.state.services.cart.remove_item(&intruder, 123_456).await;
    assert_matches!(result, Err(ServiceError::CartItemUnauthorized));

    // The owner's line is untouched
    let cart = app
        .state
        .services
        .cart
        .find_active(owner_role_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.state.services.cart.lines_of(cart.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn find_or_create_reuses_the_active_cart() {
    let app = TestApp::new().await;
    let (_, user_role_id) = app.seed_buyer("reuse@example.com").await;

    let first = app
        .state
        .services
        .cart
        .find_or_create_active(user_role_id)
        .await
        .unwrap();
    let second = app
        .state
        .services
        .cart
        .find_or_create_active(user_role_id)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn illegal_transitions_are_rejected() {
    let app = TestApp::new().await;
    let (_, user_role_id) = app.seed_buyer("fsm@example.com").await;

    let cart = app
        .state
        .services
        .cart
        .find_or_create_active(user_role_id)
        .await
        .unwrap();

    // Active -> Completed skips Processing
    assert_matches!(
        app.state
            .services
            .cart
            .transition_to(cart.id, CartStatus::Completed)
            .await,
        Err(ServiceError::InvalidCartTransition { .. })
    );

    let cart = app
        .state
        .services
        .cart
        .transition_to(cart.id, CartStatus::Processing)
        .await
        .unwrap();
    assert_eq!(cart.status, CartStatus::Processing);

    // A processing cart is invisible to "find my cart"
    assert!(app
        .state
        .services
        .cart
        .find_active(user_role_id)
        .await
        .unwrap()
        .is_none());

    // ...and cannot be mutated
    assert_matches!(
        app.state
            .services
            .cart
            .add_or_update_line(cart.id, 1, 1)
            .await,
        Err(ServiceError::InvalidOperation(_))
    );

    let cart = app
        .state
        .services
        .cart
        .transition_to(cart.id, CartStatus::Completed)
        .await
        .unwrap();
    assert_eq!(cart.status, CartStatus::Completed);
}
