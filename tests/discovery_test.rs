//! watch 参数、实例描述映射、重试策略和配置加载测试

use flare_instancer::discovery::endpoints_from_payload;
use flare_instancer::{
    Config, ConsulConfig, ExponentialBackoffPolicy, FixedRetryPolicy, InstancerConfig,
    InstancerError, LogFormat, RetryPolicy, ServiceEntry, TerminationPolicy, WatchParams,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_parse_full_service_watch() {
    let parsed = WatchParams::parse(&params(&[
        ("type", json!("service")),
        ("service", json!("billing")),
        ("tag", json!(["blue", "v2"])),
        ("passingonly", json!(true)),
        ("stale", json!(true)),
        ("datacenter", json!("dc2")),
        ("token", json!("acl-token")),
    ]))
    .unwrap();

    assert_eq!(
        parsed,
        WatchParams {
            service: "billing".to_string(),
            tags: vec!["blue".to_string(), "v2".to_string()],
            passing_only: true,
            allow_stale: true,
            datacenter: Some("dc2".to_string()),
            token: Some("acl-token".to_string()),
        }
    );
}

#[test]
fn test_parse_rejects_invalid_parameters() {
    let cases = vec![
        params(&[("service", json!("web"))]),
        params(&[("type", json!("key")), ("service", json!("web"))]),
        params(&[("type", json!("service"))]),
        params(&[("type", json!("service")), ("service", json!(""))]),
        params(&[("type", json!("service")), ("service", json!(42))]),
        params(&[("type", json!("service")), ("service", json!("a/b"))]),
        params(&[("type", json!("service")), ("service", json!("web")), ("passingonly", json!("yes"))]),
        params(&[("type", json!("service")), ("service", json!("web")), ("tag", json!([1]))]),
        params(&[("type", json!("service")), ("service", json!("web")), ("tag", json!("a?b"))]),
        params(&[("type", json!("service")), ("service", json!("web")), ("handler", json!("x"))]),
    ];

    for case in cases {
        let result = WatchParams::parse(&case);
        assert!(
            matches!(result, Err(InstancerError::InvalidWatchPlan { .. })),
            "expected rejection for {:?}, got {:?}",
            case,
            result
        );
    }
}

#[test]
fn test_params_from_config_omit_empty_tag() {
    let config = InstancerConfig::new("web").with_tag("").with_allow_stale(true);
    let parsed = WatchParams::from_config(&config).unwrap();

    assert_eq!(parsed.service, "web");
    assert!(parsed.tags.is_empty());
    assert!(parsed.allow_stale);
    assert!(!parsed.passing_only);

    let tagged = WatchParams::from_config(&InstancerConfig::new("web").with_tag("canary")).unwrap();
    assert_eq!(tagged.tags, vec!["canary"]);
}

#[test]
fn test_endpoint_prefers_service_address() {
    let payload = json!([
        { "Node": { "Address": "10.0.0.1" }, "Service": { "Address": "", "Port": 8080 } },
        { "Node": { "Address": "10.0.0.2" }, "Service": { "Address": "10.0.0.9", "Port": 9090 } }
    ]);

    assert_eq!(
        endpoints_from_payload(&payload).unwrap(),
        vec!["10.0.0.1:8080", "10.0.0.9:9090"]
    );
}

#[test]
fn test_service_entry_decodes_consul_response() {
    let raw = r#"{
        "Node": {
            "ID": "40e4a748-2192-161a-0510-9bf59fe950b5",
            "Node": "foobar",
            "Address": "10.1.10.12",
            "Datacenter": "dc1",
            "TaggedAddresses": { "lan": "10.1.10.12", "wan": "10.1.10.12" }
        },
        "Service": {
            "ID": "redis",
            "Service": "redis",
            "Tags": null,
            "Address": "10.1.10.12",
            "Meta": { "redis_version": "4.0" },
            "Port": 8000
        },
        "Checks": [
            { "Node": "foobar", "CheckID": "service:redis", "Name": "Service 'redis' check", "Status": "passing" }
        ]
    }"#;

    let entry: ServiceEntry = serde_json::from_str(raw).unwrap();
    assert_eq!(entry.node.node, "foobar");
    assert_eq!(entry.service.id, "redis");
    assert!(entry.service.tags.is_empty());
    assert_eq!(entry.service.meta.get("redis_version").map(String::as_str), Some("4.0"));
    assert_eq!(entry.checks[0].status, "passing");
    assert_eq!(entry.endpoint(), "10.1.10.12:8000");
}

#[test]
fn test_endpoints_reject_wrong_shape() {
    for payload in [json!({}), json!("web"), json!([{ "Node": {} }]), json!([null])] {
        assert!(endpoints_from_payload(&payload).is_err(), "accepted {}", payload);
    }
    assert!(endpoints_from_payload(&json!([])).unwrap().is_empty());
}

#[test]
fn test_exponential_backoff_is_capped() {
    let policy = ExponentialBackoffPolicy::new(
        None,
        Duration::from_millis(100),
        Duration::from_secs(1),
    );

    assert_eq!(policy.max_attempts(), None);
    assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
    assert_eq!(policy.backoff_duration(4), Duration::from_millis(800));
    assert_eq!(policy.backoff_duration(5), Duration::from_secs(1));
    assert_eq!(policy.backoff_duration(500), Duration::from_secs(1));
}

#[test]
fn test_retry_registry_errors_within_budget() {
    let policy = FixedRetryPolicy::new(Some(2), Duration::from_millis(5));
    let unavailable = InstancerError::Status {
        status: 503,
        body: String::new(),
    };
    let forbidden = InstancerError::Status {
        status: 403,
        body: "ACL not found".to_string(),
    };

    assert_eq!(policy.max_attempts(), Some(2));
    assert!(policy.should_retry(1, &unavailable));
    assert!(policy.should_retry(2, &unavailable));
    assert!(!policy.should_retry(3, &unavailable));
    assert!(policy.should_retry(1, &forbidden));
    assert!(!policy.should_retry(3, &forbidden));
    assert!(policy.should_retry(1, &InstancerError::Watch("missing header".to_string())));
    assert!(!policy.should_retry(1, &InstancerError::Closed));
    assert!(!policy.should_retry(1, &InstancerError::Config("bad address".to_string())));

    let unlimited = FixedRetryPolicy::new(None, Duration::from_millis(5));
    assert!(unlimited.should_retry(10_000, &unavailable));
    assert!(unlimited.should_retry(10_000, &forbidden));
    assert_eq!(unlimited.max_attempts(), None);
}

#[test]
fn test_config_from_toml() {
    let raw = r#"
        [consul]
        address = "http://consul.service:8500"
        token = "acl-token"
        wait_secs = 60
        max_failures = 10

        [instancer]
        service = "billing"
        tag = "blue"
        passing_only = true
        on_termination = "mark_terminated"

        [log]
        format = "json"
    "#;

    let config: Config = toml::from_str(raw).unwrap();
    assert_eq!(config.consul.address, "http://consul.service:8500");
    assert_eq!(config.consul.token.as_deref(), Some("acl-token"));
    assert_eq!(config.consul.wait(), Duration::from_secs(60));
    assert_eq!(config.consul.retry_base_ms, 5_000);
    assert_eq!(config.consul.max_failures, Some(10));
    assert_eq!(config.instancer.service, "billing");
    assert_eq!(config.instancer.tag.as_deref(), Some("blue"));
    assert!(config.instancer.passing_only);
    assert!(!config.instancer.allow_stale);
    assert_eq!(config.instancer.on_termination, TerminationPolicy::MarkTerminated);
    assert!(config.instancer.logger.is_none());
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.log.filter, "info");
}

#[test]
fn test_config_defaults() {
    let config: Config = toml::from_str("[instancer]\nservice = \"web\"\n").unwrap();
    assert_eq!(config.consul.address, "http://127.0.0.1:8500");
    assert_eq!(config.instancer.on_termination, TerminationPolicy::Abort);
    assert_eq!(config.log.format, LogFormat::Text);

    let consul = ConsulConfig {
        wait_secs: 16,
        ..Default::default()
    };
    assert_eq!(consul.request_timeout(), Duration::from_secs(22));
}

#[test]
fn test_load_missing_config_file() {
    let err = Config::load_from_file("/nonexistent/instancer.toml").unwrap_err();
    assert!(matches!(err, InstancerError::Io(_)));
}

#[test]
fn test_normalize_consul_address() {
    use flare_instancer::config::normalize_address;

    assert_eq!(normalize_address("127.0.0.1:8500"), "http://127.0.0.1:8500");
    assert_eq!(normalize_address("https://consul:8501/"), "https://consul:8501");
}
