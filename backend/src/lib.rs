use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use manifest_core::{decoded_basename, Manifest, ManifestError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "data.json";
pub const IMAGES_DIR: &str = "images";
pub const SOUNDS_DIR: &str = "sounds";

/// Latest broadcast value for polling viewers. A new send simply replaces
/// the previous one; there is no history and no per-client cursor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Broadcast {
    Text { content: String },
    Image { content: String, size: u32 },
}

#[derive(Clone)]
pub struct AppState {
    games_root: Arc<PathBuf>,
    latest: Arc<RwLock<Option<Broadcast>>>,
}

impl AppState {
    pub fn new(games_root: impl Into<PathBuf>) -> Self {
        Self {
            games_root: Arc::new(games_root.into()),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn games_root(&self) -> &FsPath {
        &self.games_root
    }

    async fn broadcast(&self, msg: Broadcast) {
        *self.latest.write().await = Some(msg);
    }

    pub async fn latest_broadcast(&self) -> Option<Broadcast> {
        self.latest.read().await.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("No data.json found for game '{0}'")]
    GameNotFound(String),
    #[error("Image file not found")]
    FileNotFound,
    #[error("Soundclip not found")]
    SoundclipNotFound,
    #[error("Image not found")]
    ImageNotFound,
    #[error("Failed to decode JSON")]
    Decode(#[source] serde_json::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("invalid upload: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::GameNotFound(_)
            | ApiError::FileNotFound
            | ApiError::SoundclipNotFound
            | ApiError::ImageNotFound => StatusCode::NOT_FOUND,
            ApiError::Decode(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ManifestError> for ApiError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::ImageNotFound => ApiError::ImageNotFound,
            ManifestError::SoundclipNotFound => ApiError::SoundclipNotFound,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {self}");
        }
        (status, Json(json!({"result": false, "error": self.to_string()}))).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/getGames", get(get_games))
        .route("/getGames/:title", get(get_game_data))
        .route("/createGame", post(create_game))
        .route("/upload-text-voice", post(upload_text_voice))
        .route("/upload-image", post(upload_image))
        .route("/remove-image", delete(remove_image))
        .route("/getSoundTexts/:game", get(get_sound_texts))
        .route("/getImages/:game", get(get_images))
        .route("/update-sound-text", post(update_sound_text))
        .route("/updateImage/:game", post(update_image))
        .route("/api/send_text", post(send_text))
        .route("/send_image/:game", post(send_image))
        .route("/api/get_updates", get(get_updates))
        .with_state(state)
}

// --- filesystem game store ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSummary {
    pub name: String,
    pub thumbnail: String,
}

/// URL path under which the hosting layer serves game content.
fn static_url(game: &str, subfolder: &str, filename: &str) -> String {
    format!("/static/games/{game}/{subfolder}/{filename}")
}

async fn list_games(root: &FsPath) -> io::Result<Vec<GameSummary>> {
    let mut games = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let thumbnail = match find_thumbnail(&entry.path()).await {
            Some(filename) => format!("/static/games/{name}/{filename}"),
            None => String::new(),
        };
        games.push(GameSummary { name, thumbnail });
    }
    Ok(games)
}

/// Finds a `thumbnail.*` file directly inside the game folder, if any.
async fn find_thumbnail(dir: &FsPath) -> Option<String> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let filename = entry.file_name().to_string_lossy().to_string();
        if filename.starts_with("thumbnail.") {
            return Some(filename);
        }
    }
    None
}

async fn load_manifest(root: &FsPath, game: &str) -> Result<Manifest, ApiError> {
    let path = root.join(game).join(MANIFEST_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::GameNotFound(game.to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes).map_err(ApiError::Decode)
}

/// Upload routes tolerate a game whose manifest was never written; they
/// start from an empty document and create the file on save.
async fn load_manifest_or_default(root: &FsPath, game: &str) -> Result<Manifest, ApiError> {
    match load_manifest(root, game).await {
        Ok(manifest) => Ok(manifest),
        Err(ApiError::GameNotFound(_)) => Ok(Manifest::new()),
        Err(err) => Err(err),
    }
}

async fn save_manifest(root: &FsPath, game: &str, manifest: &Manifest) -> Result<(), ApiError> {
    let path = root.join(game).join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(manifest).map_err(ApiError::Decode)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

/// Writes an uploaded file under its original filename (last write wins on
/// a name collision) and returns the URL path clients use to fetch it.
async fn save_uploaded_file(
    root: &FsPath,
    game: &str,
    subfolder: &str,
    file: &UploadedFile,
) -> Result<String, ApiError> {
    let dir = root.join(game).join(subfolder);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&file.filename), &file.bytes).await?;
    Ok(static_url(game, subfolder, &file.filename))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::MissingField(field)),
    }
}

// --- handlers ---

async fn get_games(State(state): State<AppState>) -> Result<Json<Vec<GameSummary>>, ApiError> {
    let games = list_games(state.games_root()).await?;
    Ok(Json(games))
}

async fn get_game_data(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Result<Json<Manifest>, ApiError> {
    let manifest = load_manifest(state.games_root(), &title).await?;
    Ok(Json(manifest))
}

async fn create_game(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut game_name: Option<String> = None;
    let mut thumbnail: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "gameName" => game_name = Some(field.text().await?),
            "thumbnail" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                thumbnail = Some(UploadedFile { filename, bytes });
            }
            _ => {}
        }
    }

    let game_name = required(game_name, "gameName")?;
    let thumbnail = thumbnail.ok_or(ApiError::MissingField("thumbnail"))?;

    let game_dir = state.games_root().join(&game_name);
    tokio::fs::create_dir_all(game_dir.join(IMAGES_DIR)).await?;
    tokio::fs::create_dir_all(game_dir.join(SOUNDS_DIR)).await?;

    // The thumbnail keeps its original extension, whatever follows the
    // last dot in the uploaded filename.
    let ext = thumbnail.filename.rsplit('.').next().unwrap_or_default();
    tokio::fs::write(game_dir.join(format!("thumbnail.{ext}")), &thumbnail.bytes).await?;

    save_manifest(state.games_root(), &game_name, &Manifest::new()).await?;
    info!(game = %game_name, "game created");

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Game created successfully"})),
    )
        .into_response())
}

async fn upload_text_voice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut text: Option<String> = None;
    let mut game_name: Option<String> = None;
    let mut voice: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => text = Some(field.text().await?),
            "gameName" => game_name = Some(field.text().await?),
            "voice" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                voice = Some(UploadedFile { filename, bytes });
            }
            _ => {}
        }
    }

    let text = required(text, "text")?;
    let game_name = required(game_name, "gameName")?;
    let voice = voice.ok_or(ApiError::MissingField("voice"))?;

    let soundclip = save_uploaded_file(state.games_root(), &game_name, SOUNDS_DIR, &voice).await?;

    let mut manifest = load_manifest_or_default(state.games_root(), &game_name).await?;
    manifest.add_sound(text, soundclip);
    save_manifest(state.games_root(), &game_name, &manifest).await?;

    Ok(Json(
        json!({"result": true, "message": "Text and voice uploaded successfully"}),
    ))
}

async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut game_name: Option<String> = None;
    let mut image: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "gameName" => game_name = Some(field.text().await?),
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                image = Some(UploadedFile { filename, bytes });
            }
            _ => {}
        }
    }

    let game_name = required(game_name, "gameName")?;
    let image = image.ok_or(ApiError::MissingField("image"))?;

    let image_url = save_uploaded_file(state.games_root(), &game_name, IMAGES_DIR, &image).await?;

    let mut manifest = load_manifest_or_default(state.games_root(), &game_name).await?;
    manifest.add_image(image_url);
    save_manifest(state.games_root(), &game_name, &manifest).await?;

    Ok(Json(json!({"result": true})))
}

#[derive(Deserialize)]
struct RemoveImageRequest {
    #[serde(rename = "gameName")]
    game_name: Option<String>,
    #[serde(rename = "imageName")]
    image_name: Option<String>,
}

async fn remove_image(
    State(state): State<AppState>,
    Json(req): Json<RemoveImageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let game_name = required(req.game_name, "gameName")?;
    let image_name = required(req.image_name, "imageName")?;

    let filename = decoded_basename(&image_name);
    let file_path = state
        .games_root()
        .join(&game_name)
        .join(IMAGES_DIR)
        .join(&filename);

    match tokio::fs::remove_file(&file_path).await {
        Ok(()) => info!(game = %game_name, file = %filename, "image deleted"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::FileNotFound);
        }
        Err(err) => return Err(err.into()),
    }

    // A game without a manifest still gets its file removed; the manifest
    // edit is skipped rather than failed.
    match load_manifest(state.games_root(), &game_name).await {
        Ok(mut manifest) => {
            manifest.remove_image(&image_name);
            save_manifest(state.games_root(), &game_name, &manifest).await?;
        }
        Err(ApiError::GameNotFound(_)) => {}
        Err(err) => return Err(err),
    }

    Ok(Json(json!({"result": true})))
}

async fn get_sound_texts(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manifest = load_manifest(state.games_root(), &game).await?;
    Ok(Json(json!({"sounds": manifest.sounds})))
}

async fn get_images(
    State(state): State<AppState>,
    Path(game): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let manifest = load_manifest(state.games_root(), &game).await?;
    Ok(Json(json!({"images": manifest.images})))
}

#[derive(Deserialize)]
struct UpdateSoundTextRequest {
    #[serde(rename = "gameName")]
    game_name: Option<String>,
    soundclip: Option<String>,
    text: Option<String>,
}

async fn update_sound_text(
    State(state): State<AppState>,
    Json(req): Json<UpdateSoundTextRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let game_name = required(req.game_name, "gameName")?;
    let soundclip = required(req.soundclip, "soundclip")?;
    // An empty replacement text is allowed; only an absent field is an error.
    let text = req.text.ok_or(ApiError::MissingField("text"))?;

    let mut manifest = load_manifest(state.games_root(), &game_name).await?;
    manifest.update_sound_text(&soundclip, text.clone())?;
    save_manifest(state.games_root(), &game_name, &manifest).await?;

    // Viewers polling for updates see the new text immediately.
    state.broadcast(Broadcast::Text { content: text }).await;

    Ok(Json(
        json!({"result": true, "message": "Sound text updated successfully"}),
    ))
}

#[derive(Deserialize)]
struct UpdateImageRequest {
    image_name: String,
    image_size: u32,
    #[serde(rename = "isLanding")]
    is_landing: bool,
}

async fn update_image(
    State(state): State<AppState>,
    Path(game): Path<String>,
    Json(req): Json<UpdateImageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut manifest = load_manifest(state.games_root(), &game).await?;
    manifest.update_image(&req.image_name, req.image_size, req.is_landing)?;
    save_manifest(state.games_root(), &game, &manifest).await?;

    Ok(Json(json!({"message": "Image updated successfully"})))
}

#[derive(Deserialize)]
struct SendTextRequest {
    content: Option<String>,
}

async fn send_text(
    State(state): State<AppState>,
    Json(req): Json<SendTextRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content = required(req.content, "content")?;
    state.broadcast(Broadcast::Text { content }).await;
    Ok(Json(json!({"result": true})))
}

fn default_send_size() -> u32 {
    manifest_core::DEFAULT_IMAGE_SIZE
}

#[derive(Deserialize)]
struct SendImageRequest {
    image_name: Option<String>,
    #[serde(default = "default_send_size")]
    image_size: u32,
}

async fn send_image(
    State(state): State<AppState>,
    Path(game): Path<String>,
    Json(req): Json<SendImageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let image_name = required(req.image_name, "image_name")?;
    let image_url = static_url(&game, IMAGES_DIR, &image_name);

    state
        .broadcast(Broadcast::Image {
            content: image_name,
            size: req.image_size,
        })
        .await;

    Ok(Json(json!({"result": true, "image_url": image_url})))
}

async fn get_updates(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.latest_broadcast().await {
        Some(msg) => Json(json!({"result": true, "messages": [msg]})),
        None => Json(json!({"result": false})),
    }
}
