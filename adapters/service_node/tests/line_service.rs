use std::io::Cursor;

use fiducial_sim_core::{CoeffsResponse, LINE_COEFFICIENTS_ENDPOINT};
use fiducial_sim_service_node::{NodeError, Reply, ServeOutcome, ServiceNode};
use fiducial_sim_system_line_coefficients::{CoefficientRanges, LineCoefficientService};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn node() -> ServiceNode {
    let mut node = ServiceNode::new("get_straightline_node");
    node.advertise(
        LINE_COEFFICIENTS_ENDPOINT,
        LineCoefficientService::new(
            CoefficientRanges::default(),
            ChaCha8Rng::seed_from_u64(11),
        ),
    )
    .expect("endpoint is free");
    node
}

fn replies(output: &[u8]) -> Vec<Reply> {
    String::from_utf8(output.to_vec())
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("reply line is valid json"))
        .collect()
}

#[test]
fn ready_call_returns_coefficient_pair() {
    let mut node = node();

    let response = node
        .call(LINE_COEFFICIENTS_ENDPOINT, r#"{"ready":true}"#)
        .expect("ready call succeeds");
    let response: CoeffsResponse = serde_json::from_str(&response).expect("coeffs response");

    assert!(0.1 < response.slope() && response.slope() < 10.0);
    assert!(0.0 < response.intercept() && response.intercept() < 0.3);
    assert!(!node.is_shut_down());
}

#[test]
fn not_ready_call_fails_and_shuts_node_down() {
    let mut node = node();

    let error = node
        .call(LINE_COEFFICIENTS_ENDPOINT, r#"{"ready":false}"#)
        .expect_err("not-ready call fails");

    assert!(matches!(
        error,
        NodeError::Fatal { ref endpoint, .. } if endpoint == LINE_COEFFICIENTS_ENDPOINT
    ));
    assert!(node.is_shut_down());
    assert!(matches!(
        node.call(LINE_COEFFICIENTS_ENDPOINT, r#"{"ready":true}"#),
        Err(NodeError::ShutDown(_))
    ));
}

#[test]
fn missing_ready_field_is_malformed_not_fatal() {
    let mut node = node();

    let error = node
        .call(LINE_COEFFICIENTS_ENDPOINT, "{}")
        .expect_err("ready is required");

    assert!(matches!(error, NodeError::MalformedRequest { .. }));
    assert!(!node.is_shut_down());
}

#[test]
fn serve_answers_each_line_until_input_ends() {
    let mut node = node();
    let input = concat!(
        r#"{"endpoint":"/straight_line_coefficients","request":{"ready":true}}"#,
        "\n",
        "not json\n",
        "\n",
        r#"{"endpoint":"/unknown","request":{}}"#,
        "\n",
        r#"{"endpoint":"/straight_line_coefficients","request":{"ready":true}}"#,
        "\n",
    );
    let mut output = Vec::new();

    let outcome = node
        .serve(Cursor::new(input), &mut output)
        .expect("serve loop completes");

    assert_eq!(outcome, ServeOutcome::Drained);
    let replies = replies(&output);
    assert_eq!(replies.len(), 4, "blank lines are skipped");
    assert!(matches!(replies[0], Reply::Ok(_)));
    assert!(matches!(&replies[1], Reply::Error(message) if message.starts_with("malformed envelope")));
    assert!(matches!(&replies[2], Reply::Error(message) if message.contains("/unknown")));
    assert!(matches!(replies[3], Reply::Ok(_)));
}

#[test]
fn serve_answers_lines_after_invalid_utf8() {
    let mut node = node();
    let mut input = b"\xff\xfe garbage\n".to_vec();
    input.extend_from_slice(
        br#"{"endpoint":"/straight_line_coefficients","request":{"ready":true}}"#,
    );
    let mut output = Vec::new();

    let outcome = node
        .serve(Cursor::new(input), &mut output)
        .expect("serve loop completes");

    assert_eq!(outcome, ServeOutcome::Drained);
    let replies = replies(&output);
    assert_eq!(replies.len(), 2);
    assert!(matches!(&replies[0], Reply::Error(message) if message.starts_with("malformed request line")));
    assert!(matches!(replies[1], Reply::Ok(_)), "final line without newline is answered");
}

#[test]
fn serve_stops_after_fatal_request() {
    let mut node = node();
    let input = concat!(
        r#"{"endpoint":"/straight_line_coefficients","request":{"ready":false}}"#,
        "\n",
        r#"{"endpoint":"/straight_line_coefficients","request":{"ready":true}}"#,
        "\n",
    );
    let mut output = Vec::new();

    let outcome = node
        .serve(Cursor::new(input), &mut output)
        .expect("serve loop completes");

    assert_eq!(outcome, ServeOutcome::ShutDown);
    let replies = replies(&output);
    assert_eq!(replies.len(), 1, "requests after shutdown are not read");
    assert!(matches!(&replies[0], Reply::Error(message) if message.contains("fatally")));
}

#[test]
fn ok_reply_carries_coeffs_field() {
    let mut node = node();
    let input = "{\"endpoint\":\"/straight_line_coefficients\",\"request\":{\"ready\":true}}\n";
    let mut output = Vec::new();

    let _ = node
        .serve(Cursor::new(input), &mut output)
        .expect("serve loop completes");

    let Reply::Ok(value) = replies(&output).remove(0) else {
        panic!("expected an ok reply");
    };
    let response: CoeffsResponse = serde_json::from_value(value).expect("coeffs response");
    assert!(0.1 < response.slope() && response.slope() < 10.0);
}
