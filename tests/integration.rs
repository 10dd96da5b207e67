use base64::Engine as _;
use cine_studio::{
    ai::{GeminiFrameClient, GeminiVideoClient, PollConfig},
    app::{Studio, StudioServices},
    models::{Config, MediaReference, ReferenceRole, VideoHandle, VideoModel},
    prompts,
    session::{SessionContext, StaticCredentialSelector},
    Error,
};
use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPERATION_PATH: &str = "/v1beta/models/veo/operations/op-7";
const DOWNLOAD_PATH: &str = "/v1beta/files/clip:download";
const FAST_SUBMIT_PATH: &str = "/v1beta/models/veo-3.1-fast-generate-preview:predictLongRunning";
const PRO_SUBMIT_PATH: &str = "/v1beta/models/veo-3.1-generate-preview:predictLongRunning";

const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const MP4: [u8; 8] = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p'];

fn test_config(server: &MockServer, output_dir: PathBuf) -> Config {
    Config {
        api_key: Some("integration-key".to_string()),
        base_url: server.uri(),
        image_model: "gemini-2.5-flash-image".to_string(),
        poll_interval: Duration::from_millis(5),
        max_poll_attempts: Some(50),
        output_dir,
    }
}

fn pending() -> serde_json::Value {
    serde_json::json!({ "name": "models/veo/operations/op-7" })
}

fn finished(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "name": "models/veo/operations/op-7",
        "done": true,
        "response": { "generateVideoResponse": { "generatedSamples": [{
            "video": { "uri": format!("{}{}", server.uri(), DOWNLOAD_PATH) }
        }] } }
    })
}

async fn mount_video_pipeline(server: &MockServer, submit_path: &str) {
    Mock::given(method("POST"))
        .and(path(submit_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending()))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(pending()))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(OPERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(finished(server)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(DOWNLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(MP4.to_vec()),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn posted_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_storyboard_frames_for_robot_script() {
    let server = MockServer::start().await;
    let encoded = base64::engine::general_purpose::STANDARD.encode(PNG);
    let parts: Vec<serde_json::Value> = (0..4)
        .map(|_| serde_json::json!({ "inlineData": { "mimeType": "image/png", "data": encoded } }))
        .collect();

    Mock::given(method("POST"))
        .and(path_regex(r":generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({ "candidates": [{ "content": { "parts": parts } }] }),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let studio = Studio::from_config(&test_config(&server, dir.path().to_path_buf()), None);
    studio.set_prompt("A robot walks through rain");

    let frames = studio.generate_frames().await.unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(studio.previews().len(), 4);

    let body = &posted_bodies(&server).await[0];
    let instruction = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(instruction.contains("A robot walks through rain"));
    assert!(!instruction.contains("IDENTITY LOCK"));
}

#[tokio::test]
async fn test_lead_character_forces_high_fidelity_video() {
    let server = MockServer::start().await;
    mount_video_pipeline(&server, PRO_SUBMIT_PATH).await;
    Mock::given(method("POST"))
        .and(path(FAST_SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let studio = Studio::from_config(&test_config(&server, dir.path().to_path_buf()), None);
    studio.set_prompt("She crosses the bridge at night");
    studio.select_model(VideoModel::Fast);
    studio.set_references(vec![MediaReference::for_role(
        PNG.to_vec(),
        ReferenceRole::Character,
    )]);

    let entry = studio.generate_video().await.unwrap();
    assert_eq!(entry.model, VideoModel::HighFidelity);
    assert_eq!(entry.result.blob.as_bytes(), &MP4);
    assert_eq!(studio.history().len(), 1);

    let body = &posted_bodies(&server).await[0];
    let prompt = body["instances"][0]["prompt"].as_str().unwrap();
    assert!(prompt.starts_with(prompts::IDENTITY_MAPPING_PREFIX));
    assert!(prompt.ends_with("She crosses the bridge at night"));
    assert_eq!(
        body["parameters"]["referenceImages"][0]["referenceType"],
        "asset"
    );

    let exported = studio.export(dir.path()).unwrap();
    assert_eq!(std::fs::read(exported).unwrap(), MP4.to_vec());
}

#[tokio::test]
async fn test_saved_token_extends_previous_video() {
    let server = MockServer::start().await;
    mount_video_pipeline(&server, PRO_SUBMIT_PATH).await;

    let token_json =
        r#"{ "uri": "https://example.com/v1.mp4", "mimeType": "video/mp4" }"#.to_string();
    let previous: VideoHandle = serde_json::from_str(&token_json).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let studio = Studio::from_config(&test_config(&server, dir.path().to_path_buf()), None);
    let entry = studio
        .extend_from(previous.clone(), "The storm breaks")
        .await
        .unwrap();
    assert_eq!(entry.model, VideoModel::HighFidelity);

    let body = &posted_bodies(&server).await[0];
    assert_eq!(body["instances"][0]["prompt"], "STORY CONTINUITY: The storm breaks");
    assert_eq!(
        body["instances"][0]["video"],
        serde_json::to_value(&previous).unwrap()
    );
}

#[tokio::test]
async fn test_rejected_credential_triggers_reselection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FAST_SUBMIT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let selector = StaticCredentialSelector::new("replacement-key");
    let studio = Studio::with_services(
        StudioServices {
            frames: Box::new(GeminiFrameClient::new().with_base_url(server.uri())),
            video: Box::new(
                GeminiVideoClient::new()
                    .with_base_url(server.uri())
                    .with_poll_config(PollConfig {
                        interval: Duration::from_millis(5),
                        max_attempts: Some(5),
                    }),
            ),
            credentials: Box::new(selector.clone()),
        },
        SessionContext::authorized("revoked-key"),
    );
    studio.set_prompt("A quiet harbor at dawn");

    let err = studio.generate_video().await.unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));
    assert_eq!(selector.get_call_count(), 1);
    assert_eq!(studio.session().api_key().unwrap(), "replacement-key");
    assert!(studio.history().is_empty());
}
