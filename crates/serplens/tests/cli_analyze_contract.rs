use axum::{http::header, http::StatusCode, routing::get, Json, Router};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn hermetic(cmd: &mut std::process::Command) -> &mut std::process::Command {
    cmd.env_remove("SERPLENS_ENV_FILE")
        .env_remove("SERPLENS_VALUESERP_API_KEY")
        .env_remove("VALUESERP_API_KEY")
        .env_remove("SERPLENS_VALUESERP_ENDPOINT")
        .env_remove("HTTP_PROXY")
        .env_remove("HTTPS_PROXY")
        .env_remove("ALL_PROXY")
        .env_remove("http_proxy")
        .env_remove("https_proxy")
        .env_remove("all_proxy")
}

fn page(body: &'static str) -> ([(header::HeaderName, &'static str); 1], String) {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        format!("<html><body><nav class=\"menu\">Home</nav><main>{body}</main></body></html>"),
    )
}

/// One server plays both ValueSERP and the ranked pages.
async fn spawn_fixture() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let links = base.clone();
    let app = Router::new()
        .route(
            "/search",
            get(move || {
                let b = links.clone();
                async move {
                    Json(serde_json::json!({
                        "request_info": {"success": true},
                        "organic_results": [
                            {"position": 1, "link": format!("{b}/page/a"), "title": "A"},
                            {"position": 2, "link": format!("{b}/mine"), "title": "Mine"},
                            {"position": 3, "link": format!("{b}/page/missing"), "title": "Gone"},
                            {"position": 4, "link": format!("{b}/page/c"), "title": "C"}
                        ]
                    }))
                }
            }),
        )
        .route(
            "/page/a",
            get(|| async {
                page(
                    "<h1>Neapolitan pizza in Paris</h1>\
                     <p>Our Neapolitan pizza is baked in a wood-fired oven. \
                     Neapolitan pizza needs San Marzano tomatoes. Pizza dough rests two days.</p>",
                )
            }),
        )
        .route(
            "/page/c",
            get(|| async {
                page(
                    "<h1>Best pizza restaurants</h1>\
                     <p>The best pizza restaurants in Paris serve Neapolitan pizza \
                     with buffalo mozzarella and fresh basil.</p>",
                )
            }),
        )
        .route(
            "/mine",
            get(|| async {
                page(
                    "<h1>Pizza night</h1>\
                     <p>Pizza night at our place: thin crust pizza, wood-fired oven, \
                     and a glass of wine.</p>",
                )
            }),
        )
        .route(
            "/page/missing",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_folds_competitors_and_writes_csv() {
    let base = spawn_fixture().await;
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("out").join("pizza.csv");

    let user_url = format!("{base}/mine");
    let csv_arg = csv_path.clone();
    let out = tokio::task::spawn_blocking(move || {
        let bin = assert_cmd::cargo::cargo_bin!("serplens");
        hermetic(&mut std::process::Command::new(bin))
            .args([
                "analyze",
                "--keyword",
                "pizza paris",
                "--location",
                "Paris,Ile-de-France,France",
                "--user-url",
                &user_url,
                "--concurrency",
                "2",
                "--output",
                "json",
                "--csv",
            ])
            .arg(&csv_arg)
            .env("SERPLENS_VALUESERP_API_KEY", "test-key")
            .env("SERPLENS_VALUESERP_ENDPOINT", &base)
            .output()
            .expect("run serplens analyze")
    })
    .await
    .unwrap();

    assert!(
        out.status.success(),
        "analyze failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse analyze json");
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["kind"].as_str(), Some("analyze"));

    let run = &v["run"];
    assert_eq!(run["user_serp_position"].as_u64(), Some(2));

    // Four competitors plus the user page, in rank order.
    let docs = run["documents"].as_array().expect("documents");
    assert_eq!(docs.len(), 5);
    assert_eq!(docs[2]["warning"].as_str(), Some("fetch_failed"));
    assert_eq!(docs[4]["slot"].as_u64(), Some(10));
    let warnings: Vec<&str> = run["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w.as_str())
        .collect();
    assert!(warnings.contains(&"some_documents_failed"));

    let rows = run["rows"].as_array().expect("rows");
    assert!(!rows.is_empty());
    let mut prev = u64::MAX;
    for r in rows {
        let occ: Vec<u64> = r["occurrences"]
            .as_array()
            .unwrap()
            .iter()
            .map(|x| x.as_u64().unwrap())
            .collect();
        assert_eq!(occ.len(), 11);
        // The missing page contributes nothing.
        assert_eq!(occ[2], 0);
        let total = r["total_occurrence"].as_u64().unwrap();
        assert_eq!(total, occ.iter().sum::<u64>());
        assert!(total <= prev, "rows not sorted by total");
        prev = total;
    }
    assert!(rows
        .iter()
        .any(|r| r["term"].as_str().unwrap().to_lowercase().contains("pizza")));

    let bytes = std::fs::read(&csv_path).expect("csv written");
    assert!(bytes.starts_with(UTF8_BOM));
    let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..]).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("term,total_occurrence,max_occurrence,max_occurrence_url,score,ranking,mean_top_3")
    );
    assert_eq!(lines.count(), rows.len());
    assert_eq!(v["table"].as_array().unwrap().len(), rows.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analyze_with_no_results_prints_no_results() {
    let app = Router::new().route(
        "/search",
        get(|| async { Json(serde_json::json!({"request_info": {"success": true}})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let out = tokio::task::spawn_blocking(move || {
        let bin = assert_cmd::cargo::cargo_bin!("serplens");
        hermetic(&mut std::process::Command::new(bin))
            .args(["analyze", "--keyword", "nothing here"])
            .env("SERPLENS_VALUESERP_API_KEY", "test-key")
            .env("SERPLENS_VALUESERP_ENDPOINT", &base)
            .output()
            .expect("run serplens analyze")
    })
    .await
    .unwrap();

    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("No results."), "{s}");
}

#[test]
fn analyze_without_api_key_fails() {
    let bin = assert_cmd::cargo::cargo_bin!("serplens");
    let out = hermetic(&mut std::process::Command::new(bin))
        .args(["analyze", "--keyword", "pizza", "--output", "json"])
        .output()
        .expect("run serplens analyze");

    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse error json");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["error"]["code"].as_str(), Some("not_configured"));
}
