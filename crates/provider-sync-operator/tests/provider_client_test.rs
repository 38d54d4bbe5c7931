//! Integration tests for the provider gateway client using wiremock
//!
//! These verify the HTTP contract each service relies on: routes, the region
//! header, bearer auth and error body decoding.

use std::collections::BTreeMap;
use std::time::Duration;

use provider_sync_operator::client::{ClientError, ProviderClient, ProviderHealth, REGION_HEADER};
use provider_sync_operator::crd::{AccessKeyStatusType, IpPermission, IpRange};
use provider_sync_operator::services::cloudformation::{self, StackApi, StackTemplate};
use provider_sync_operator::services::ec2::{
    self, CreateSecurityGroupRequest, RuleDirection, SecurityGroupApi,
};
use provider_sync_operator::services::elasticsearch::{self, DomainApi};
use provider_sync_operator::services::iam::AccessKeyApi;
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer) -> ProviderClient {
    ProviderClient::new(
        &server.uri(),
        Some("test-token".to_string()),
        Duration::from_secs(5),
    )
    .expect("valid client")
}

mod ec2_security_groups {
    use super::*;

    #[tokio::test]
    async fn test_describe_sends_region_and_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/ec2/security-groups/sg-123"))
            .and(header(REGION_HEADER, "eu-west-1"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "securityGroups": [{
                    "groupId": "sg-123",
                    "groupName": "web",
                    "ownerId": "111122223333",
                    "vpcId": "vpc-1",
                    "ipPermissions": [{
                        "ipProtocol": "tcp",
                        "fromPort": 443,
                        "toPort": 443,
                        "ipRanges": [{"cidrIp": "10.0.0.0/8"}]
                    }],
                    "tags": [{"key": "team", "value": "platform"}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let groups = client(&server)
            .describe_security_groups("eu-west-1", "sg-123")
            .await
            .expect("should describe");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].vpc_id.as_deref(), Some("vpc-1"));
        assert_eq!(groups[0].ip_permissions[0].from_port, Some(443));
        assert_eq!(groups[0].tag_map()["team"], "platform");
    }

    #[tokio::test]
    async fn test_create_posts_request_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/ec2/security-groups"))
            .and(body_json(json!({
                "groupName": "web",
                "description": "web tier",
                "vpcId": "vpc-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"groupId": "sg-new"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .create_security_group(
                "us-east-1",
                &CreateSecurityGroupRequest {
                    group_name: "web".to_string(),
                    description: "web tier".to_string(),
                    vpc_id: Some("vpc-1".to_string()),
                    tags: Vec::new(),
                },
            )
            .await
            .expect("should create");

        assert_eq!(id, "sg-new");
    }

    #[tokio::test]
    async fn test_revoke_egress_route() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/ec2/security-groups/sg-123/egress/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let rule = IpPermission {
            ip_protocol: "-1".to_string(),
            from_port: None,
            to_port: None,
            ip_ranges: vec![IpRange {
                cidr_ip: "0.0.0.0/0".to_string(),
                description: None,
            }],
        };
        client(&server)
            .revoke_rules("us-east-1", "sg-123", RuleDirection::Egress, &[rule])
            .await
            .expect("should revoke");
    }

    #[tokio::test]
    async fn test_error_body_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/ec2/security-groups/sg-gone"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "InvalidGroup.NotFound",
                "message": "The security group 'sg-gone' does not exist"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .describe_security_groups("us-east-1", "sg-gone")
            .await
            .unwrap_err();

        assert!(ec2::is_group_not_found(&err));
        assert_eq!(err.status(), Some(400));
        assert!(err.message().unwrap().contains("does not exist"));
    }
}

mod iam_access_keys {
    use super::*;

    #[tokio::test]
    async fn test_requests_carry_no_region() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/iam/users/ci-bot/access-keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessKeyMetadata": [{
                    "accessKeyId": "AKIA1",
                    "userName": "ci-bot",
                    "status": "Inactive"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let keys = client(&server)
            .list_access_keys("ci-bot")
            .await
            .expect("should list");
        assert_eq!(keys[0].status, AccessKeyStatusType::Inactive);

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(REGION_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_create_returns_secret() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/iam/users/ci-bot/access-keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessKey": {
                    "accessKeyId": "AKIA2",
                    "secretAccessKey": "s3cr3t",
                    "status": "Active"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let key = client(&server)
            .create_access_key("ci-bot")
            .await
            .expect("should create");
        assert_eq!(key.access_key_id, "AKIA2");
        assert_eq!(key.secret_access_key, "s3cr3t");
    }

    #[tokio::test]
    async fn test_user_name_is_path_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/iam/users/ci%2Fbot/access-keys/AKIA1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_access_key("ci/bot", "AKIA1")
            .await
            .expect("should delete");
    }
}

mod cloudformation_stacks {
    use super::*;

    #[tokio::test]
    async fn test_create_drops_empty_parameters() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/cloudformation/stacks"))
            .and(header(REGION_HEADER, "us-west-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stackId": "arn:stack/app"})))
            .expect(1)
            .mount(&server)
            .await;

        let parameters = BTreeMap::from([
            ("Env".to_string(), "prod".to_string()),
            ("Unused".to_string(), String::new()),
        ]);
        let id = client(&server)
            .create_stack("us-west-2", "app", &StackTemplate::new("{}", &parameters))
            .await
            .expect("should create");
        assert_eq!(id, "arn:stack/app");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["stackName"], "app");
        assert_eq!(body["parameters"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_stack_validation_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cloudformation/stacks/app"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "ValidationError",
                "message": "Stack with id app does not exist"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .describe_stacks("us-east-1", "app")
            .await
            .unwrap_err();
        assert!(cloudformation::is_stack_not_found(&err));
    }
}

mod elasticsearch_domains {
    use super::*;

    #[tokio::test]
    async fn test_describe_domain() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/es/domains/logs"))
            .and(header_exists(REGION_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "arn": "arn:es:logs",
                "domainId": "123/logs",
                "domainName": "logs",
                "endpoint": "search-logs.example.com",
                "created": true,
                "processing": false,
                "elasticsearchVersion": "7.10"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let domain = client(&server)
            .describe_domain("us-east-1", "logs")
            .await
            .expect("should describe");
        assert!(domain.created);
        assert_eq!(domain.endpoint.as_deref(), Some("search-logs.example.com"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/es/domains/logs"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "ResourceNotFoundException",
                "message": "Domain not found: logs"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .describe_domain("us-east-1", "logs")
            .await
            .unwrap_err();
        assert!(elasticsearch::is_domain_not_found(&err));
    }
}

mod readiness {
    use super::*;

    async fn readiness_with(status: u16) -> Result<bool, ClientError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        client(&server).check_readiness().await
    }

    #[tokio::test]
    async fn test_ready() {
        assert!(readiness_with(200).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_ready() {
        assert!(!readiness_with(503).await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let err = readiness_with(500).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_non_json_error_body_keeps_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/es/domains/logs"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server)
            .describe_domain("us-east-1", "logs")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("Bad Gateway"));
        assert_eq!(err.message(), Some("bad gateway"));
    }
}
