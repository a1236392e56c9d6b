mod common;

use common::{FakeCloud, TestCloud};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use vpcflow_cloud::provider::{TAG_ENV, TAG_NAME, TAG_NETWORK, Tags};
use vpcflow_cloud::{CloudApi, CloudContext, CloudError, LogPolicy, NetworkState};

#[tokio::test]
async fn test_create_then_find_returns_same_network() {
    let t = TestCloud::new();
    let networks = t.ctx.networks();

    let created = assert_ok!(networks.create_network("app1", "10.1.0.0/16").await);
    assert_eq!(created.state, NetworkState::Available);
    assert_eq!(created.qualified_name, "dev.app1");

    let found = assert_ok!(networks.find_network("app1").await).unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.cidr_block, "10.1.0.0/16");

    let tags = t.cloud.state().vpcs[0].tags.clone();
    assert_eq!(tags.get(TAG_NAME), Some("dev.app1"));
    assert_eq!(tags.get(TAG_ENV), Some("dev"));
}

#[tokio::test]
async fn test_find_missing_network_is_none() {
    let t = TestCloud::new();
    assert!(assert_ok!(t.ctx.networks().find_network("nope").await).is_none());

    let err = assert_err!(t.ctx.networks().require_network("nope").await);
    assert!(matches!(err, CloudError::ResourceNotFound(_)));
}

#[tokio::test]
async fn test_list_networks_is_scoped_to_environment() {
    let t = TestCloud::new();
    t.ctx.networks().create_network("app1", "10.1.0.0/16").await.unwrap();
    t.ctx.networks().create_network("app2", "10.2.0.0/16").await.unwrap();

    // 別環境のネットワーク
    let api: Arc<dyn CloudApi> = t.cloud.clone();
    let prod = CloudContext::new("prod", api)
        .with_waits(common::quick_waits())
        .with_log_policy(LogPolicy::Quiet);
    prod.networks()
        .create_network("app1", "10.9.0.0/16")
        .await
        .unwrap();

    let names: Vec<String> = t
        .ctx
        .networks()
        .list_networks()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.qualified_name)
        .collect();
    assert_eq!(names, vec!["dev.app1", "dev.app2"]);
}

#[tokio::test]
async fn test_create_existing_network_is_rejected() {
    let t = TestCloud::new();
    t.ctx.networks().create_network("app1", "10.1.0.0/16").await.unwrap();

    let err = assert_err!(t.ctx.networks().create_network("app1", "10.3.0.0/16").await);
    assert!(matches!(err, CloudError::AlreadyExists(_)));
    assert_eq!(t.cloud.live_vpc_count(), 1);
}

#[tokio::test]
async fn test_invalid_cidr_creates_nothing() {
    let t = TestCloud::new();
    let err = assert_err!(t.ctx.networks().create_network("app1", "10.1.0.0").await);
    assert!(matches!(err, CloudError::InvalidConfig(_)));
    assert!(t.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_is_ambiguous() {
    let t = TestCloud::new();
    let api = t.cloud.clone();
    for cidr in ["10.1.0.0/16", "10.2.0.0/16"] {
        let vpc = api.create_vpc(cidr).await.unwrap();
        api.create_tags(
            &vpc.id,
            &Tags::new().with(TAG_NAME, "dev.app1").with(TAG_ENV, "dev"),
        )
        .await
        .unwrap();
    }

    let err = assert_err!(t.ctx.networks().find_network("app1").await);
    assert!(matches!(err, CloudError::Ambiguous { count: 2, .. }));
}

#[tokio::test]
async fn test_tagging_failure_deletes_the_vpc() {
    let t = TestCloud::new();
    t.cloud.fail_on("create_tags", "RequestLimitExceeded");

    let err = assert_err!(t.ctx.networks().create_network("app1", "10.1.0.0/16").await);
    assert!(matches!(err, CloudError::Api(ref m) if m == "RequestLimitExceeded"));
    assert_eq!(t.cloud.live_vpc_count(), 0);
    assert!(t.cloud.position("delete_vpc").is_some());
}

#[tokio::test]
async fn test_wait_timeout_deletes_the_vpc() {
    let t = TestCloud::new();
    t.cloud.stall();

    let err = assert_err!(t.ctx.networks().create_network("app1", "10.1.0.0/16").await);
    assert!(matches!(err, CloudError::Timeout { ref last_observed, .. } if last_observed == "pending"));
    assert_eq!(t.cloud.live_vpc_count(), 0);
}

#[tokio::test]
async fn test_destroy_network_without_dependents() {
    let t = TestCloud::new();
    t.ctx.networks().create_network("app1", "10.1.0.0/16").await.unwrap();

    let report = assert_ok!(t.ctx.networks().destroy_network("app1").await).unwrap();
    assert!(report.is_success());
    assert_eq!(report.succeeded_steps("delete-vpc").len(), 1);
    assert!(assert_ok!(t.ctx.networks().find_network("app1").await).is_none());
}

#[tokio::test]
async fn test_destroy_missing_network_is_none() {
    let t = TestCloud::new();
    let report = assert_ok!(t.ctx.networks().destroy_network("ghost").await);
    assert!(report.is_none());
    assert!(t.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_destroy_removes_dependents_in_order() {
    let t = TestCloud::new();
    let networks = t.ctx.networks();
    let net = networks.create_network("app1", "10.1.0.0/16").await.unwrap();
    let zone = t.ctx.zones().create_zone(&net, "web", "10.1.1.0/24").await.unwrap();
    let group = t
        .ctx
        .security()
        .create_security_group(&net, "web", "web servers")
        .await
        .unwrap();
    networks.create_gateway(&net).await.unwrap();
    t.ctx
        .instances()
        .launch(&zone, "web1", &group.id, &Default::default())
        .await
        .unwrap();

    let report = networks.destroy_network("app1").await.unwrap().unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failed);

    let terminate = t.cloud.position("terminate_instance").unwrap();
    let group_delete = t.cloud.position("delete_security_group").unwrap();
    let detach = t.cloud.position("detach_internet_gateway").unwrap();
    let gateway_delete = t.cloud.position("delete_internet_gateway").unwrap();
    let subnet_delete = t.cloud.position("delete_subnet").unwrap();
    let vpc_delete = t.cloud.position("delete_vpc").unwrap();
    assert!(terminate < group_delete);
    assert!(group_delete < detach);
    assert!(detach < gateway_delete);
    assert!(gateway_delete < subnet_delete);
    assert!(subnet_delete < vpc_delete);

    // default グループは削除対象外
    assert!(
        t.cloud
            .calls()
            .iter()
            .filter(|c| c.starts_with("delete_security_group"))
            .all(|c| c.ends_with(&group.id))
    );
    assert_eq!(t.cloud.live_vpc_count(), 0);
}

#[tokio::test]
async fn test_destroy_continues_past_failures() {
    let t = TestCloud::new();
    let net = t
        .ctx
        .networks()
        .create_network("app1", "10.1.0.0/16")
        .await
        .unwrap();
    t.ctx.zones().create_zone(&net, "a", "10.1.1.0/24").await.unwrap();
    t.ctx.zones().create_zone(&net, "b", "10.1.2.0/24").await.unwrap();
    t.ctx
        .security()
        .create_security_group(&net, "web", "web")
        .await
        .unwrap();
    t.cloud.fail_on("delete_security_group", "InternalError");

    let report = t.ctx.networks().destroy_network("app1").await.unwrap().unwrap();
    assert!(!report.is_success());
    assert_eq!(report.succeeded_steps("delete-subnet").len(), 2);
    assert!(report.failed.iter().any(|f| f.step == "delete-security-group"));
    // グループが残っているので VPC 削除も失敗として記録される
    assert!(report.failed.iter().any(|f| f.step == "delete-vpc"));
}

#[tokio::test]
async fn test_gateway_is_tagged_and_attached() {
    let t = TestCloud::new();
    let net = t
        .ctx
        .networks()
        .create_network("admin", "10.255.255.0/24")
        .await
        .unwrap();
    let gateway_id = t.ctx.networks().create_gateway(&net).await.unwrap();

    let state = t.cloud.state();
    let gateway = state.gateways.iter().find(|g| g.id == gateway_id).unwrap();
    assert_eq!(gateway.attached_vpc_ids, vec![net.id.clone()]);
    assert_eq!(gateway.tags.get(TAG_NAME), Some("dev.admin.gateway"));
    assert_eq!(gateway.tags.get(TAG_NETWORK), Some("dev.admin"));
}

#[tokio::test]
async fn test_route_table_lookup_requires_exactly_one() {
    let t = TestCloud::new();
    let net = t
        .ctx
        .networks()
        .create_network("app1", "10.1.0.0/16")
        .await
        .unwrap();
    t.cloud.state().route_tables.retain(|r| r.vpc_id != net.id);

    let err = assert_err!(t.ctx.networks().route_table(&net).await);
    assert!(matches!(err, CloudError::Ambiguous { count: 0, .. }));
}

#[tokio::test]
async fn test_fake_cloud_starts_empty() {
    let cloud = FakeCloud::new();
    assert_eq!(cloud.live_vpc_count(), 0);
}
