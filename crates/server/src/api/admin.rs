//! Admin, health, and the public installer script.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

const INSTALL_SH: &str = r#"#!/bin/sh
# Scriberr CLI installer.
set -eu

SCRIBERR_URL="${SCRIBERR_URL:-http://localhost:8080}"
INSTALL_DIR="${INSTALL_DIR:-$HOME/.local/bin}"

mkdir -p "$INSTALL_DIR"
cat > "$INSTALL_DIR/scriberr-cli" <<EOF
#!/bin/sh
exec curl -sS -H "Authorization: Bearer \${SCRIBERR_TOKEN:?set SCRIBERR_TOKEN}" "$SCRIBERR_URL/api/v1/\$@"
EOF
chmod +x "$INSTALL_DIR/scriberr-cli"

echo "installed $INSTALL_DIR/scriberr-cli (server: $SCRIBERR_URL)"
echo "pair this device: open $SCRIBERR_URL and visit Settings > API"
"#;

pub async fn install_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/x-shellscript")], INSTALL_SH)
}
