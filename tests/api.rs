//! Handler-level integration tests driving the real `axum::Router` over a
//! migrated test database, the idiomatic way to test an axum+sqlx service
//! without binding a socket (`tower::ServiceExt::oneshot`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use quickly_pick::config::Config;
use quickly_pick::db::Database;
use quickly_pick::state::AppState;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        admin_salt: "test-admin-salt".into(),
        slug_salt: "test-slug-salt".into(),
        ip_salt: "test-ip-salt".into(),
        port: 0,
        max_db_connections: 5,
    }
}

fn router(pool: PgPool) -> axum::Router {
    let state = AppState {
        db: Database::from_pool(pool),
        config: Arc::new(test_config()),
    };
    quickly_pick::build_router(state)
}

// Axum's `ConnectInfo` extractor needs a per-connection extension, which
// plain `oneshot` does not provide on its own; insert it the same way
// `into_make_service_with_connect_info` would for a real listener.
async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let mut req = req;
    req.extensions_mut().insert(axum::extract::ConnectInfo(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        0,
    )));
    let response = app.oneshot(req).await.expect("router never errors");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_with(path: &str, header: (&str, &str), body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header(header.0, header.1)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().method("GET").uri(path).body(Body::empty()).unwrap()
}

fn get_with(path: &str, header: (&str, &str)) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header(header.0, header.1)
        .body(Body::empty())
        .unwrap()
}

/// Spec §8 end-to-end scenario 1: create, add options, publish, vote, close.
#[sqlx::test(migrations = "./migrations")]
async fn lunch_poll_end_to_end(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (status, body) = send(
        app.clone(),
        post(
            "/polls",
            json!({"title": "Lunch?", "creator_name": "Ana"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["Pizza", "Tacos", "Sushi"] {
        let (status, _) = send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let slug = body["share_slug"].as_str().unwrap().to_string();

    // Results are sealed while open.
    let (status, _) = send(app.clone(), get(&format!("/polls/{slug}/results"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, public_poll) = send(app.clone(), get(&format!("/polls/{slug}"))).await;
    let options = public_poll["options"].as_array().unwrap();
    let option_id = |label: &str| -> String {
        options
            .iter()
            .find(|o| o["label"] == label)
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let pizza = option_id("Pizza");
    let tacos = option_id("Tacos");
    let sushi = option_id("Sushi");

    let mut tokens = Vec::new();
    for username in ["u1", "u2", "u3"] {
        let (status, body) = send(
            app.clone(),
            post(
                &format!("/polls/{slug}/claim-username"),
                json!({"username": username}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tokens.push(body["voter_token"].as_str().unwrap().to_string());
    }

    let ballots = [
        (&tokens[0], 0.9, 0.3, 0.5),
        (&tokens[1], 0.4, 0.4, 0.8),
        (&tokens[2], 0.5, 0.1, 0.9),
    ];
    for (token, p, t, s) in ballots {
        let (status, _) = send(
            app.clone(),
            post_with(
                &format!("/polls/{slug}/ballots"),
                ("x-voter-token", token),
                json!({"scores": {pizza.clone(): p, tacos.clone(): t, sushi.clone(): s}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(app.clone(), get(&format!("/polls/{slug}/ballot-count"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ballot_count"], 3);

    let (status, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/close"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rankings = body["snapshot"]["rankings"].as_array().unwrap();
    let labels: Vec<&str> = rankings.iter().map(|r| r["label"].as_str().unwrap()).collect();
    assert_eq!(labels, vec!["Sushi", "Pizza", "Tacos"]);

    // After close, results are public and a second close is rejected.
    let (status, _) = send(app.clone(), get(&format!("/polls/{slug}/results"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/close"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn ballot_rejects_out_of_range_score(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (_, body) = send(
        app.clone(),
        post("/polls", json!({"title": "T", "creator_name": "C"})),
    )
    .await;
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["A", "B"] {
        send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
    }
    let (_, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    let slug = body["share_slug"].as_str().unwrap().to_string();

    let (_, body) = send(
        app.clone(),
        post(&format!("/polls/{slug}/claim-username"), json!({"username": "voter"})),
    )
    .await;
    let token = body["voter_token"].as_str().unwrap().to_string();

    let (_, public_poll) = send(app.clone(), get(&format!("/polls/{slug}"))).await;
    let option_id = public_poll["options"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app.clone(),
        post_with(
            &format!("/polls/{slug}/ballots"),
            ("x-voter-token", &token),
            json!({"scores": {option_id: 1.2}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_username_claim_conflicts(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (_, body) = send(
        app.clone(),
        post("/polls", json!({"title": "T", "creator_name": "C"})),
    )
    .await;
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["A", "B"] {
        send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
    }
    let (_, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    let slug = body["share_slug"].as_str().unwrap().to_string();

    let (status_a, _) = send(
        app.clone(),
        post(&format!("/polls/{slug}/claim-username"), json!({"username": "same"})),
    )
    .await;
    let (status_b, _) = send(
        app.clone(),
        post(&format!("/polls/{slug}/claim-username"), json!({"username": "same"})),
    )
    .await;
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::CONFLICT);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn resubmitting_a_ballot_preserves_ballot_id_and_count(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (_, body) = send(
        app.clone(),
        post("/polls", json!({"title": "T", "creator_name": "C"})),
    )
    .await;
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["A", "B"] {
        send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
    }
    let (_, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    let slug = body["share_slug"].as_str().unwrap().to_string();

    let (_, body) = send(
        app.clone(),
        post(&format!("/polls/{slug}/claim-username"), json!({"username": "u1"})),
    )
    .await;
    let token = body["voter_token"].as_str().unwrap().to_string();

    let (_, public_poll) = send(app.clone(), get(&format!("/polls/{slug}"))).await;
    let a_id = public_poll["options"][0]["id"].as_str().unwrap().to_string();
    let b_id = public_poll["options"][1]["id"].as_str().unwrap().to_string();

    let (_, first) = send(
        app.clone(),
        post_with(
            &format!("/polls/{slug}/ballots"),
            ("x-voter-token", &token),
            json!({"scores": {a_id.clone(): 0.9, b_id.clone(): 0.3}}),
        ),
    )
    .await;
    let first_ballot_id = first["ballot_id"].as_str().unwrap().to_string();

    let (_, second) = send(
        app.clone(),
        post_with(
            &format!("/polls/{slug}/ballots"),
            ("x-voter-token", &token),
            json!({"scores": {a_id.clone(): 0.1, b_id.clone(): 0.9}}),
        ),
    )
    .await;
    assert_eq!(second["ballot_id"].as_str().unwrap(), first_ballot_id);

    let (_, my_ballot) = send(
        app.clone(),
        get_with(&format!("/polls/{slug}/my-ballot"), ("x-voter-token", &token)),
    )
    .await;
    assert_eq!(my_ballot["scores"][a_id.as_str()], 0.1);
    assert_eq!(my_ballot["has_voted"], true);

    let (_, count) = send(app.clone(), get(&format!("/polls/{slug}/ballot-count"))).await;
    assert_eq!(count["ballot_count"], 1);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_key_rejects_wrong_poll(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (_, body_a) = send(
        app.clone(),
        post("/polls", json!({"title": "A", "creator_name": "C"})),
    )
    .await;
    let (_, body_b) = send(
        app.clone(),
        post("/polls", json!({"title": "B", "creator_name": "C"})),
    )
    .await;
    let poll_a = body_a["poll_id"].as_str().unwrap().to_string();
    let admin_b = body_b["admin_key"].as_str().unwrap().to_string();

    let (status, _) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_a}/options"),
            ("x-admin-key", &admin_b),
            json!({"label": "X"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

/// Spec §8 concurrency property: 100 parallel submissions from the same
/// voter token must yield exactly one ballot row, not a 500 from a
/// `23505` unique-violation race.
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_submits_from_one_voter_yield_a_single_ballot(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool.clone());

    let (_, body) = send(
        app.clone(),
        post("/polls", json!({"title": "T", "creator_name": "C"})),
    )
    .await;
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["A", "B"] {
        send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
    }
    let (_, body) = send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;
    let slug = body["share_slug"].as_str().unwrap().to_string();

    let (_, body) = send(
        app.clone(),
        post(&format!("/polls/{slug}/claim-username"), json!({"username": "u1"})),
    )
    .await;
    let token = body["voter_token"].as_str().unwrap().to_string();

    let (_, public_poll) = send(app.clone(), get(&format!("/polls/{slug}"))).await;
    let a_id = public_poll["options"][0]["id"].as_str().unwrap().to_string();

    let requests = (0..100).map(|i| {
        let app = app.clone();
        let slug = slug.clone();
        let token = token.clone();
        let a_id = a_id.clone();
        async move {
            send(
                app,
                post_with(
                    &format!("/polls/{slug}/ballots"),
                    ("x-voter-token", &token),
                    json!({"scores": {a_id: (i % 2) as f64}}),
                ),
            )
            .await
        }
    });
    let results = futures::future::join_all(requests).await;
    for (status, _) in &results {
        assert_eq!(*status, StatusCode::OK);
    }

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ballot WHERE poll_id = $1")
        .bind(&poll_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

/// Spec §8 concurrency property: two parallel close requests on the same
/// poll must yield exactly one 200 and one 409, never two successful closes.
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_close_requests_yield_one_winner(pool: PgPool) -> sqlx::Result<()> {
    let app = router(pool);

    let (_, body) = send(
        app.clone(),
        post("/polls", json!({"title": "T", "creator_name": "C"})),
    )
    .await;
    let poll_id = body["poll_id"].as_str().unwrap().to_string();
    let admin_key = body["admin_key"].as_str().unwrap().to_string();

    for label in ["A", "B"] {
        send(
            app.clone(),
            post_with(
                &format!("/polls/{poll_id}/options"),
                ("x-admin-key", &admin_key),
                json!({"label": label}),
            ),
        )
        .await;
    }
    send(
        app.clone(),
        post_with(
            &format!("/polls/{poll_id}/publish"),
            ("x-admin-key", &admin_key),
            json!({}),
        ),
    )
    .await;

    let closes = (0..2).map(|_| {
        let app = app.clone();
        let poll_id = poll_id.clone();
        let admin_key = admin_key.clone();
        async move {
            send(
                app,
                post_with(
                    &format!("/polls/{poll_id}/close"),
                    ("x-admin-key", &admin_key),
                    json!({}),
                ),
            )
            .await
        }
    });
    let results = futures::future::join_all(closes).await;
    let ok_count = results.iter().filter(|(s, _)| *s == StatusCode::OK).count();
    let conflict_count = results
        .iter()
        .filter(|(s, _)| *s == StatusCode::CONFLICT)
        .count();
    assert_eq!(ok_count, 1);
    assert_eq!(conflict_count, 1);

    Ok(())
}
