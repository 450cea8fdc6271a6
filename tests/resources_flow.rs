mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, TimeZone, Utc};
use common::{acquire_db_lock, json_body, TestApp};
use resource_directory::clock::FixedClock;
use serde_json::{json, Value};

fn draft_payload(name: &str) -> Value {
    json!({
        "name": name,
        "phone": "555-0100",
    })
}

fn review_ready_payload(name: &str) -> Value {
    json!({
        "name": name,
        "phone": "555-0100",
        "city": "Springfield",
        "state": "il",
        "postal_code": "62701",
        "description": "Weekly food pantry for families in need.",
        "source": "Phone call with site coordinator",
    })
}

async fn create(app: &TestApp, token: &str, payload: &Value) -> Result<Value> {
    let response = app.post_json("/api/resources", payload, Some(token)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

fn field_names(body: &Value) -> Vec<String> {
    body["fields"]
        .as_object()
        .map(|fields| fields.keys().cloned().collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn create_records_first_version_and_audit_entry() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;
    let reviewer = app.user_token("rae", "reviewer").await?;

    let resource = create(&app, &editor, &review_ready_payload("Food Pantry")).await?;
    assert_eq!(resource["status"], "draft");
    assert_eq!(resource["state"], "IL");
    let id = resource["id"].as_i64().unwrap_or_default();

    let response = app
        .get(&format!("/api/resources/{id}/versions"), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let versions = json_body(response).await?;
    let versions = versions.as_array().cloned().unwrap_or_default();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["version_number"], 1);
    assert_eq!(versions[0]["change_type"], "create");
    assert_eq!(versions[0]["snapshot"]["name"], "Food Pantry");
    assert_eq!(versions[0]["snapshot"]["status"], "draft");
    let changed = versions[0]["changed_fields"].as_array().cloned().unwrap_or_default();
    assert!(changed.contains(&json!("name")));
    assert!(!changed.contains(&json!("id")));

    let response = app
        .get(
            &format!("/api/audit-logs?target_table=resources&target_id={id}"),
            Some(&reviewer),
        )
        .await?;
    let entries = json_body(response).await?;
    let entries = entries.as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "create_resource");
    assert_eq!(entries[0]["metadata"]["kind"], "resource_written");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_payloads_write_nothing() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;

    let response = app
        .post_json("/api/resources", &json!({ "name": "  " }), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(field_names(&body), vec!["name", "phone"]);

    let mut payload = draft_payload("Shelter");
    payload["status"] = json!("needs_review");
    let response = app.post_json("/api/resources", &payload, Some(&editor)).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(
        field_names(&body),
        vec!["city", "description", "source", "state"]
    );

    assert_eq!(app.count_rows("resources").await?, 0);
    assert_eq!(app.count_rows("resource_versions").await?, 0);
    assert_eq!(app.count_rows("audit_logs WHERE action <> 'login'").await?, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn status_workflow_enforces_rules_and_roles() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;
    let reviewer = app.user_token("rae", "reviewer").await?;

    let resource = create(&app, &editor, &draft_payload("Clinic")).await?;
    let id = resource["id"].as_i64().unwrap_or_default();
    let status_path = format!("/api/resources/{id}/status");

    let response = app
        .post_json(&status_path, &json!({ "status": "needs_review" }), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert!(field_names(&body).contains(&"city".to_string()));

    let response = app
        .patch_json(
            &format!("/api/resources/{id}"),
            &json!({
                "city": "Springfield",
                "state": "IL",
                "description": "Free walk-in clinic with sliding scale fees.",
                "source": "Clinic website",
            }),
            Some(&editor),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(&status_path, &json!({ "status": "needs_review" }), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(&status_path, &json!({ "status": "published" }), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(&status_path, &json!({ "status": "published" }), Some(&reviewer))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(
        field_names(&body),
        vec!["last_verified_at", "last_verified_by"]
    );

    let response = app
        .post_json(&format!("/api/resources/{id}/verify"), &json!({}), Some(&reviewer))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(&status_path, &json!({ "status": "published" }), Some(&reviewer))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let published = json_body(response).await?;
    assert_eq!(published["status"], "published");

    let response = app
        .get(&format!("/api/resources/{id}/versions"), Some(&editor))
        .await?;
    let versions = json_body(response).await?;
    let summary: Vec<(i64, String)> = versions
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|v| {
            (
                v["version_number"].as_i64().unwrap_or_default(),
                v["change_type"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, "create".to_string()),
            (2, "update".to_string()),
            (3, "status_change".to_string()),
            (4, "update".to_string()),
            (5, "status_change".to_string()),
        ]
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn sequential_saves_number_versions_without_gaps() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;

    let resource = create(&app, &editor, &draft_payload("Legal Aid")).await?;
    let id = resource["id"].as_i64().unwrap_or_default();

    for round in 1..=5 {
        let response = app
            .patch_json(
                &format!("/api/resources/{id}"),
                &json!({ "notes": format!("call round {round}") }),
                Some(&editor),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .get(&format!("/api/resources/{id}/versions"), Some(&editor))
        .await?;
    let versions = json_body(response).await?;
    let numbers: Vec<i64> = versions
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|v| v["version_number"].as_i64().unwrap_or_default())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);

    let response = app
        .get(&format!("/api/resources/{id}/versions/6"), Some(&editor))
        .await?;
    let latest = json_body(response).await?;
    assert_eq!(latest["changed_fields"], json!(["notes"]));
    assert_eq!(latest["snapshot"]["notes"], "call round 5");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn reads_and_noop_patches_do_not_write_history() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;

    let resource = create(&app, &editor, &draft_payload("Warming Center")).await?;
    let id = resource["id"].as_i64().unwrap_or_default();
    let versions_before = app.count_rows("resource_versions").await?;
    let audit_before = app.count_rows("audit_logs").await?;

    for _ in 0..3 {
        let response = app.get(&format!("/api/resources/{id}"), Some(&editor)).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.get("/api/resources", Some(&editor)).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .patch_json(
            &format!("/api/resources/{id}"),
            &json!({ "name": "Warming Center", "phone": "555-0100" }),
            Some(&editor),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.count_rows("resource_versions").await?, versions_before);
    assert_eq!(app.count_rows("audit_logs").await?, audit_before);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn viewers_only_see_published_resources() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;
    let viewer = app.user_token("vic", "viewer").await?;

    let resource = create(&app, &editor, &draft_payload("Tutoring")).await?;
    let id = resource["id"].as_i64().unwrap_or_default();

    let response = app.get(&format!("/api/resources/{id}"), Some(&viewer)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/resources", Some(&viewer)).await?;
    let listed = json_body(response).await?;
    assert_eq!(listed, json!([]));

    let response = app
        .post_json("/api/resources", &draft_payload("Sneaky"), Some(&viewer))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get(&format!("/api/resources/{id}/versions"), Some(&viewer))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn archive_restore_and_delete_are_admin_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;
    let admin = app.user_token("ada", "admin").await?;

    let resource = create(&app, &editor, &draft_payload("Transit Vouchers")).await?;
    let id = resource["id"].as_i64().unwrap_or_default();
    let archive_path = format!("/api/resources/{id}/archive");

    let response = app
        .post_json(&archive_path, &json!({ "reason": "closed" }), Some(&editor))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(&archive_path, &json!({ "reason": "  " }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json(&archive_path, &json!({ "reason": "Program closed" }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let archived = json_body(response).await?;
    assert_eq!(archived["is_archived"], true);
    assert_eq!(archived["archive_reason"], "Program closed");

    let response = app.get("/api/resources", Some(&admin)).await?;
    assert_eq!(json_body(response).await?, json!([]));

    let response = app
        .post_json(&format!("/api/resources/{id}/restore"), &json!({}), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let restored = json_body(response).await?;
    assert_eq!(restored["is_archived"], false);
    assert_eq!(restored["archive_reason"], Value::Null);

    let response = app.delete(&format!("/api/resources/{id}"), Some(&editor)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.delete(&format!("/api/resources/{id}"), Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/api/resources/{id}"), Some(&editor)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.get(&format!("/api/resources/{id}"), Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.count_rows("resources").await?, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn verification_expiry_boundary_is_inclusive() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let now = Utc
        .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid fixed instant"))?;
    let app = TestApp::with_clock(Arc::new(FixedClock(now))).await?;
    let editor = app.user_token("eddie", "editor").await?;
    let reviewer_id = app.insert_user("rae", "password123", "reviewer").await?;
    let reviewer = app.login_token("rae", "password123").await?;

    let mut payload = review_ready_payload("Senior Meals");
    payload["status"] = json!("needs_review");
    let on_edge = create(&app, &editor, &payload).await?;
    payload["name"] = json!("Senior Meals Annex");
    let stale = create(&app, &editor, &payload).await?;

    let edge_time = now - Duration::days(180);
    let stale_time = edge_time - Duration::seconds(1);
    for (resource, verified_at) in [(&on_edge, edge_time), (&stale, stale_time)] {
        app.execute_sql(&format!(
            "UPDATE resources SET last_verified_at = '{}', last_verified_by = '{}' WHERE id = {}",
            verified_at.format("%Y-%m-%d %H:%M:%S+00"),
            reviewer_id,
            resource["id"],
        ))
        .await?;
    }

    let response = app
        .post_json(
            &format!("/api/resources/{}/status", on_edge["id"]),
            &json!({ "status": "published" }),
            Some(&reviewer),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(
            &format!("/api/resources/{}/status", stale["id"]),
            &json!({ "status": "published" }),
            Some(&reviewer),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(field_names(&body), vec!["last_verified_at"]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn categories_are_admin_managed_and_checked_on_save() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;
    let admin = app.user_token("ada", "admin").await?;

    let payload = json!({ "name": "Food", "description": "Pantries and meal programs" });
    let response = app.post_json("/api/categories", &payload, Some(&editor)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post_json("/api/categories", &payload, Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let category = json_body(response).await?;
    let category_id = category["id"].as_i64().unwrap_or_default();

    let response = app.post_json("/api/categories", &payload, Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.get("/api/categories", Some(&editor)).await?;
    let listed = json_body(response).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let mut resource = draft_payload("Soup Kitchen");
    resource["category_id"] = json!(category_id + 100);
    let response = app.post_json("/api/resources", &resource, Some(&editor)).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(field_names(&body), vec!["category_id"]);

    resource["category_id"] = json!(category_id);
    let created = create(&app, &editor, &resource).await?;
    assert_eq!(created["category_id"], category_id);

    let response = app
        .get(&format!("/api/resources?category_id={category_id}"), Some(&editor))
        .await?;
    let filtered = json_body(response).await?;
    assert_eq!(filtered.as_array().map(Vec::len), Some(1));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn city_filter_matches_literally() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let editor = app.user_token("eddie", "editor").await?;

    create(&app, &editor, &review_ready_payload("Food Pantry")).await?;

    let response = app
        .get("/api/resources?city=springfield", Some(&editor))
        .await?;
    let matched = json_body(response).await?;
    assert_eq!(matched.as_array().map(Vec::len), Some(1));

    for pattern in ["Spring%25", "Springfiel_", "%25"] {
        let response = app
            .get(&format!("/api/resources?city={pattern}"), Some(&editor))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await?, json!([]), "city={pattern}");
    }

    app.cleanup().await?;
    Ok(())
}
