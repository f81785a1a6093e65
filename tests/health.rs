use axum_delivery_api::routes::health::health_check;

#[tokio::test]
async fn health_check_reports_ok() {
    let resp = health_check().await;
    assert_eq!(resp.0.code, 200);
    assert_eq!(resp.0.message.as_deref(), Some("Health check"));
    assert!(resp.0.data.is_some());
}
