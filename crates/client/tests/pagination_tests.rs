//! Paginated fetch tests.
//!
//! # Invariants
//! - Elements are concatenated in server page order
//! - `page`, `perPage` and `sortBy` are set on the first request
//! - A failed page fails the whole read; no partial result is returned
//! - A cursor that does not advance, or outruns its own page count, is an error
//!
//! # What this does NOT handle
//! - Per-page retry (see retry_tests.rs)

mod common;

use capella_client::{CapellaClient, RateLimiter, SortBy, get_paginated, get_paginated_with_meta};
use common::*;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};

const PROJECTS_PATH: &str = "/v4/organizations/org-1/projects";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Project {
    id: String,
    name: String,
}

fn project(id: &str) -> serde_json::Value {
    json!({"id": id, "name": format!("project {id}")})
}

fn projects_endpoint(server: &MockServer) -> EndpointConfig {
    EndpointConfig::get(format!("{}{PROJECTS_PATH}", server.uri()))
}

#[tokio::test]
async fn test_single_page_with_sort_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "1"))
        .and(query_param("perPage", "25"))
        .and(query_param("sortBy", "name"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(paginated_body(&[project("a"), project("b")], 1, 0, 1, 2)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        Some(SortBy::Name),
        &never_cancelled(),
    )
    .await
    .unwrap();

    let ids: Vec<_> = projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(projects[0].name, "project a");
}

#[tokio::test]
async fn test_sort_key_omitted_when_not_given() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param_is_missing("sortBy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paginated_body(
            &[project("a")],
            1,
            0,
            1,
            1,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn test_three_pages_concatenated_in_order() {
    let mock_server = MockServer::start().await;

    let pages = [
        (1, 2, vec![project("a"), project("b")]),
        (2, 3, vec![project("c"), project("d")]),
        (3, 0, vec![project("e")]),
    ];
    for (page, next, data) in pages {
        Mock::given(method("GET"))
            .and(path(PROJECTS_PATH))
            .and(query_param("page", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(paginated_body(&data, page, next, 3, 5)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        Some(SortBy::Id),
        &never_cancelled(),
    )
    .await
    .unwrap();

    let ids: Vec<_> = projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn test_page_count_from_last_when_totals_disagree() {
    let mock_server = MockServer::start().await;

    // totalItems says one page of 25, but the server announces two pages.
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("a")], 1, 2, 2, 2)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("b")], 2, 0, 2, 2)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(projects.len(), 2);
}

#[tokio::test]
async fn test_empty_collection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert!(projects.is_empty());
}

#[tokio::test]
async fn test_failed_page_discards_earlier_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("a")], 1, 2, 2, 2)),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(403).set_body_json(api_error_body(
            403,
            403,
            "Access Denied.",
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let result: capella_client::Result<Vec<Project>> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_follows_next_link() {
    let mock_server = MockServer::start().await;

    let mut first = paginated_body(&[project("a")], 1, 2, 2, 2);
    first["cursor"]["hrefs"]["next"] = json!(format!(
        "{}{PROJECTS_PATH}?page=2&perPage=25&continuation=abc",
        mock_server.uri()
    ));

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("page", "2"))
        .and(query_param("continuation", "abc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("b")], 2, 0, 2, 2)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(projects.len(), 2);
}

#[tokio::test]
async fn test_next_link_to_other_host_is_rejected() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    let mut first = paginated_body(&[project("a")], 1, 2, 2, 2);
    first["cursor"]["hrefs"]["next"] =
        json!(format!("{}{PROJECTS_PATH}?page=2&perPage=25", other_server.uri()));

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("b")], 2, 0, 2, 2)),
        )
        .expect(0)
        .mount(&other_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let err = get_paginated::<Project>(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unmarshal);
    other_server.verify().await;
    assert!(other_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_advancing_cursor_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("a")], 1, 1, 3, 60)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let err = get_paginated::<Project>(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unmarshal);
}

#[tokio::test]
async fn test_cursor_outrunning_its_page_count_is_rejected() {
    let mock_server = MockServer::start().await;

    // Announces a single page yet keeps pointing at a next one.
    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paginated_body(&[project("a")], 1, 2, 1, 1)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let err = get_paginated::<Project>(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unmarshal);
}

#[tokio::test]
async fn test_meta_keeps_first_page_body() {
    let mock_server = MockServer::start().await;

    let mut first = paginated_body(&[project("a")], 1, 0, 1, 1);
    first["clusterStats"] = json!({"freeTier": 1, "total": 3});

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(first))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let result = get_paginated_with_meta::<Project>(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(result.data.len(), 1);
    let raw: serde_json::Value = serde_json::from_slice(&result.raw_first_page).unwrap();
    assert_eq!(raw["clusterStats"]["total"], 3);
}

#[tokio::test]
async fn test_page_size_follows_client_setting() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .and(query_param("perPage", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paginated_body(
            &[project("a")],
            1,
            0,
            1,
            1,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CapellaClient::builder()
        .host(mock_server.uri())
        .page_size(10)
        .retry_policy(fast_retry_policy(2))
        .rate_limiter(RateLimiter::unlimited())
        .build()
        .unwrap();

    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn test_transient_page_failure_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(PROJECTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(paginated_body(
            &[project("a")],
            1,
            0,
            1,
            1,
        )))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let projects: Vec<Project> = get_paginated(
        &client,
        &token(),
        &projects_endpoint(&mock_server),
        None,
        &never_cancelled(),
    )
    .await
    .unwrap();

    assert_eq!(projects.len(), 1);
}
