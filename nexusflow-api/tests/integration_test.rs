/// End-to-end tests through the router
///
/// Tests without `#[ignore]` never reach PostgreSQL. The rest need
/// `DATABASE_URL` and run with `cargo test -- --ignored`.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{Part, TestContext, TEST_PASSWORD, TEST_UPLOAD_LIMIT, TIGHT_AUTH_LIMIT};
use nexusflow_shared::models::email_outbox::OutboxEmail;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_reports_degraded_database() {
    let ctx = TestContext::lazy();

    let (status, body) = ctx.send("GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["rate_limiter"], "local");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::lazy();

    for uri in ["/api/tasks", "/api/users", "/api/chat/rooms", "/api/auth/me"] {
        let (status, body) = ctx.send("GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["error"], "unauthorized");
    }

    let (status, _) = ctx.send("GET", "/api/tasks", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let ctx = TestContext::lazy();

    let request = Request::builder()
        .uri("/api/does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().get(header::STRICT_TRANSPORT_SECURITY).is_none());
}

#[tokio::test]
async fn test_register_validation_runs_before_database() {
    let ctx = TestContext::lazy();

    let (status, body) = ctx
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "organization_name": "Acme",
                "name": "Alice",
                "email": "not-an-email",
                "password": TEST_PASSWORD
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_login_is_rate_limited_per_email() {
    let ctx = TestContext::lazy();
    let login = |email: &str| json!({ "email": email, "password": "whatever-1234" });

    for _ in 0..TIGHT_AUTH_LIMIT {
        let (status, _) = ctx
            .send("POST", "/api/auth/login", None, Some(login("bob@acme.test")))
            .await;
        assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    let (status, body) = ctx
        .send("POST", "/api/auth/login", None, Some(login("BOB@acme.test")))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limit_exceeded");

    let (status, _) = ctx
        .send("POST", "/api/auth/login", None, Some(login("carol@acme.test")))
        .await;
    assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_registration_and_otp_flow() {
    let ctx = TestContext::connect().await.unwrap();

    let email = format!("owner-{}@acme.test", uuid::Uuid::new_v4());
    let (status, body) = ctx
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "organization_name": "Acme",
                "industry": "Manufacturing",
                "name": "Owner",
                "email": email,
                "password": TEST_PASSWORD
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["otp_expires_in"], 600);

    // unverified accounts cannot log in yet
    let credentials = json!({ "email": email, "password": TEST_PASSWORD });
    let (status, _) = ctx
        .send("POST", "/api/auth/login", None, Some(credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let outbox = OutboxEmail::list_for_address(&ctx.db, &email).await.unwrap();
    let code = outbox[0].subject.rsplit(' ').next().unwrap().to_string();

    let (status, session) = ctx
        .send(
            "POST",
            "/api/auth/verify-otp",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", session);

    let token = session["access_token"].as_str().unwrap().to_string();
    let (status, me) = ctx.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"]["name"], "Admin");
    assert_eq!(me["organization"]["name"], "Acme");
    assert!(me["user"].get("password_hash").is_none());

    // already verified: answered without sending another code
    let (status, _) = ctx
        .send("POST", "/api/auth/resend-otp", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(OutboxEmail::list_for_address(&ctx.db, &email).await.unwrap().len(), 1);

    let organization_id: uuid::Uuid = serde_json::from_value(body["organization_id"].clone()).unwrap();
    nexusflow_shared::models::organization::Organization::delete(&ctx.db, organization_id)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_task_review_workflow() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());

    let employee_role = ctx.role_named("Employee").await.unwrap();
    let employee = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "employee")
        .await
        .unwrap();
    let employee_token = ctx.token_for(&employee);

    let (status, task) = ctx
        .send(
            "POST",
            "/api/tasks",
            Some(&admin_token),
            Some(json!({ "title": "Quarterly report", "assigned_to": employee.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", task);
    assert_eq!(task["status"], "to_do");
    let task_uri = format!("/api/tasks/{}", task["id"].as_str().unwrap());

    // only the assignee may start
    let (status, _) = ctx
        .send("POST", &format!("{}/start", task_uri), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, started) = ctx
        .send("POST", &format!("{}/start", task_uri), Some(&employee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "in_progress");

    // approve is only valid from under_review
    let (status, _) = ctx
        .send("POST", &format!("{}/approve", task_uri), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .send("POST", &format!("{}/submit", task_uri), Some(&employee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .send("POST", &format!("{}/approve", task_uri), Some(&employee_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, done) = ctx
        .send(
            "POST",
            &format!("{}/approve", task_uri),
            Some(&admin_token),
            Some(json!({ "note": "Looks good" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let (status, logs) = ctx
        .send("GET", &format!("{}/logs", task_uri), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs.as_array().unwrap().len(), 4);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_direct_chat_round_trip() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let peer = ctx
        .create_user(ctx.organization_id(), None, "peer")
        .await
        .unwrap();
    let peer_token = ctx.token_for(&peer);

    let (status, room) = ctx
        .send(
            "POST",
            "/api/chat/direct",
            Some(&admin_token),
            Some(json!({ "user_id": peer.id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", room);
    let room_id = room["id"].as_str().unwrap().to_string();

    // opening it from the other side finds the same room
    let (_, again) = ctx
        .send(
            "POST",
            "/api/chat/direct",
            Some(&peer_token),
            Some(json!({ "user_id": ctx.admin().id })),
        )
        .await;
    assert_eq!(again["id"], room["id"]);

    for body in ["first", "second"] {
        let (status, _) = ctx
            .send(
                "POST",
                &format!("/api/chat/rooms/{}/messages", room_id),
                Some(&peer_token),
                Some(json!({ "body": body })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = ctx
        .send(
            "GET",
            &format!("/api/chat/rooms/{}/messages?limit=1", room_id),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"][0]["body"], "second");
    assert_eq!(page["has_more"], true);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_deactivated_member_loses_chat_and_group_access() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let member = ctx
        .create_user(ctx.organization_id(), None, "member")
        .await
        .unwrap();
    let member_token = ctx.token_for(&member);

    let (status, group) = ctx
        .send(
            "POST",
            "/api/groups",
            Some(&member_token),
            Some(json!({ "name": "Night shift" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", group);
    let group_uri = format!("/api/groups/{}", group["id"].as_str().unwrap());

    let (status, room) = ctx
        .send(
            "POST",
            "/api/chat/direct",
            Some(&member_token),
            Some(json!({ "user_id": ctx.admin().id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let room_uri = format!("/api/chat/rooms/{}", room["id"].as_str().unwrap());

    let (status, _) = ctx
        .send(
            "PUT",
            &format!("/api/users/{}", member.id),
            Some(&admin_token),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // the access token is still valid, membership is not
    let refused = [
        ("GET", room_uri.clone(), None),
        ("GET", format!("{}/messages", room_uri), None),
        ("POST", format!("{}/messages", room_uri), Some(json!({ "body": "still here?" }))),
        ("POST", format!("{}/read", room_uri), None),
        ("GET", group_uri.clone(), None),
        ("PUT", group_uri.clone(), Some(json!({ "name": "Taken over" }))),
        ("POST", format!("{}/members", group_uri), Some(json!({ "user_ids": [ctx.admin().id] }))),
        ("DELETE", format!("{}/members/{}", group_uri, member.id), None),
        ("DELETE", group_uri.clone(), None),
    ];
    for (method, uri, body) in refused {
        let (status, _) = ctx.send(method, &uri, Some(&member_token), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
    }

    let (status, detail) = ctx.send("GET", &group_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "Night shift");
    assert_eq!(detail["participants"].as_array().unwrap().len(), 1);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_user_management_rules() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let employee_role = ctx.role_named("Employee").await.unwrap();
    let manager_role = ctx.role_named("Manager").await.unwrap();

    let email = format!("new-hire-{}@nexusflow.test", uuid::Uuid::new_v4());
    let (status, created) = ctx
        .send(
            "POST",
            "/api/users",
            Some(&admin_token),
            Some(json!({
                "name": "New Hire",
                "email": email,
                "password": TEST_PASSWORD,
                "role_id": employee_role.id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert!(created.get("password_hash").is_none());
    assert_eq!(OutboxEmail::list_for_address(&ctx.db, &email).await.unwrap().len(), 1);

    // same address again
    let (status, _) = ctx
        .send(
            "POST",
            "/api/users",
            Some(&admin_token),
            Some(json!({ "name": "Copy", "email": email, "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let hire_id = created["id"].as_str().unwrap().to_string();
    let hire = nexusflow_shared::models::user::User::find_by_id(&ctx.db, hire_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    let hire_token = ctx.token_for(&hire);
    let hire_uri = format!("/api/users/{}", hire_id);

    let (status, updated) = ctx
        .send("PUT", &hire_uri, Some(&hire_token), Some(json!({ "designation": "Analyst" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["designation"], "Analyst");

    // self-promotion needs users:manage
    let (status, _) = ctx
        .send("PUT", &hire_uri, Some(&hire_token), Some(json!({ "role_id": manager_role.id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .send("PUT", &hire_uri, Some(&hire_token), Some(json!({ "password": "another-pass-2" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = ctx
        .send(
            "PUT",
            &format!("/api/users/{}", ctx.admin().id),
            Some(&hire_token),
            Some(json!({ "name": "Not Me" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_uri = format!("/api/users/{}", ctx.admin().id);
    let (status, _) = ctx
        .send("PUT", &admin_uri, Some(&admin_token), Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx.send("DELETE", &admin_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, deactivated) = ctx
        .send("PUT", &hire_uri, Some(&admin_token), Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deactivated["is_active"], false);

    let (status, _) = ctx
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.send("DELETE", &hire_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = ctx.send("GET", &hire_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_role_guards() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let admin_role = ctx.role_named("Admin").await.unwrap();
    let admin_role_uri = format!("/api/roles/{}", admin_role.id);

    let (status, _) = ctx
        .send("PUT", &admin_role_uri, Some(&admin_token), Some(json!({ "name": "Owner" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx.send("DELETE", &admin_role_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, auditor) = ctx
        .send(
            "POST",
            "/api/roles",
            Some(&admin_token),
            Some(json!({ "name": "Auditor", "permissions": ["tasks:view_all"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", auditor);
    let auditor_id: uuid::Uuid = serde_json::from_value(auditor["id"].clone()).unwrap();
    let auditor_uri = format!("/api/roles/{}", auditor_id);

    let holder = ctx
        .create_user(ctx.organization_id(), Some(auditor_id), "auditor")
        .await
        .unwrap();

    // still held by a user
    let (status, body) = ctx.send("DELETE", &auditor_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = ctx
        .send(
            "DELETE",
            &format!("/api/users/{}", holder.id),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx.send("DELETE", &auditor_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_organization_update_requires_permission() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let employee_role = ctx.role_named("Employee").await.unwrap();
    let employee = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "employee")
        .await
        .unwrap();
    let employee_token = ctx.token_for(&employee);

    let (status, _) = ctx
        .send(
            "PUT",
            "/api/organization",
            Some(&employee_token),
            Some(json!({ "name": "Hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .send("PUT", "/api/organization", Some(&admin_token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, organization) = ctx
        .send(
            "PUT",
            "/api/organization",
            Some(&admin_token),
            Some(json!({ "name": "Renamed Org", "industry": "Logistics" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", organization);
    assert_eq!(organization["name"], "Renamed Org");

    let (status, organization) = ctx
        .send("GET", "/api/organization", Some(&employee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(organization["industry"], "Logistics");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_group_administration() {
    let ctx = TestContext::new().await.unwrap();
    let employee_role = ctx.role_named("Employee").await.unwrap();
    let owner = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "owner")
        .await
        .unwrap();
    let member = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "member")
        .await
        .unwrap();
    let late = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "late")
        .await
        .unwrap();
    let owner_token = ctx.token_for(&owner);
    let member_token = ctx.token_for(&member);

    let (status, group) = ctx
        .send(
            "POST",
            "/api/groups",
            Some(&owner_token),
            Some(json!({ "name": "Design", "member_ids": [member.id, member.id] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", group);
    assert_eq!(group["participants"].as_array().unwrap().len(), 2);
    let group_uri = format!("/api/groups/{}", group["id"].as_str().unwrap());

    // plain members cannot administer
    let (status, _) = ctx
        .send("PUT", &group_uri, Some(&member_token), Some(json!({ "name": "Mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx
        .send(
            "POST",
            &format!("{}/members", group_uri),
            Some(&member_token),
            Some(json!({ "user_ids": [late.id] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.send("DELETE", &group_uri, Some(&member_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, renamed) = ctx
        .send("PUT", &group_uri, Some(&owner_token), Some(json!({ "name": "Product Design" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Product Design");

    let (status, participants) = ctx
        .send(
            "POST",
            &format!("{}/members", group_uri),
            Some(&owner_token),
            Some(json!({ "user_ids": [late.id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(participants.as_array().unwrap().len(), 3);

    let (status, _) = ctx
        .send(
            "DELETE",
            &format!("{}/members/{}", group_uri, late.id),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // leaving needs no admin rights
    let (status, _) = ctx
        .send(
            "DELETE",
            &format!("{}/members/{}", group_uri, member.id),
            Some(&member_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx.send("GET", &group_uri, Some(&member_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.send("DELETE", &group_uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    ctx.cleanup().await.unwrap();
}

/// Admin-created task assigned to a fresh employee; returns (task URI, employee token)
async fn assigned_task(ctx: &TestContext, admin_token: &str) -> (String, String) {
    let employee_role = ctx.role_named("Employee").await.unwrap();
    let employee = ctx
        .create_user(ctx.organization_id(), Some(employee_role.id), "assignee")
        .await
        .unwrap();

    let (status, task) = ctx
        .send(
            "POST",
            "/api/tasks",
            Some(admin_token),
            Some(json!({ "title": "Inventory check", "assigned_to": employee.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", task);

    (
        format!("/api/tasks/{}", task["id"].as_str().unwrap()),
        ctx.token_for(&employee),
    )
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_task_comments() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let (task_uri, employee_token) = assigned_task(&ctx, &admin_token).await;
    let comments_uri = format!("{}/comments", task_uri);

    let (status, _) = ctx
        .send("POST", &comments_uri, Some(&admin_token), Some(json!({ "body": "   " })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, comment) = ctx
        .send(
            "POST",
            &comments_uri,
            Some(&admin_token),
            Some(json!({ "body": "Count the back room too" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", comment);
    let comment_uri = format!("{}/{}", comments_uri, comment["id"].as_str().unwrap());

    let (status, listed) = ctx.send("GET", &comments_uri, Some(&employee_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["body"], "Count the back room too");

    // only the author may delete
    let (status, _) = ctx.send("DELETE", &comment_uri, Some(&employee_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx.send("DELETE", &comment_uri, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, listed) = ctx.send("GET", &comments_uri, Some(&admin_token), None).await;
    assert!(listed.as_array().unwrap().is_empty());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_attachment_upload_download_and_limits() {
    let ctx = TestContext::new().await.unwrap();
    let admin_token = ctx.token_for(ctx.admin());
    let (task_uri, employee_token) = assigned_task(&ctx, &admin_token).await;
    let attachments_uri = format!("{}/attachments", task_uri);

    let contents = b"aisle,count\n1,40\n".to_vec();
    let (status, attachment) = ctx
        .send_multipart(
            &attachments_uri,
            &employee_token,
            &[
                Part::text("note", "ignored"),
                Part::file("counts.csv", "text/csv", contents.clone()),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", attachment);
    assert_eq!(attachment["file_name"], "counts.csv");
    assert_eq!(attachment["size_bytes"], contents.len());
    assert!(attachment.get("storage_key").is_none());
    let attachment_uri = format!("{}/{}", attachments_uri, attachment["id"].as_str().unwrap());

    let (status, headers, body) = ctx.fetch(&attachment_uri, &admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("filename=\"counts.csv\""));
    assert_eq!(&body[..], &contents[..]);

    // one byte over the attachment cap
    let (status, body) = ctx
        .send_multipart(
            &attachments_uri,
            &employee_token,
            &[Part::file("big.bin", "application/octet-stream", vec![7u8; TEST_UPLOAD_LIMIT + 1])],
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", body);

    // a non-file part past the request body limit
    let (status, body) = ctx
        .send_multipart(
            &attachments_uri,
            &employee_token,
            &[
                Part::text("padding", vec![b'x'; TEST_UPLOAD_LIMIT * 3]),
                Part::file("late.txt", "text/plain", "never read"),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", body);

    let (status, _) = ctx
        .send_multipart(&attachments_uri, &employee_token, &[Part::text("note", "no file")])
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, listed) = ctx.send("GET", &attachments_uri, Some(&admin_token), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = ctx.send("DELETE", &attachment_uri, Some(&employee_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = ctx.fetch(&attachment_uri, &admin_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await.unwrap();
}
