use std::sync::Arc;

use anyhow::Context;
use repomind::{
    app_state::AppState,
    build_app,
    client::HttpRepoApi,
    config::AppConfig,
    llm::LlmManager,
    store::{MemoryStore, Neo4jStore, RepoStore},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Almacén: Neo4j si está configurado, memoria en otro caso
    let store: Arc<dyn RepoStore> = match &cfg.neo4j {
        Some(neo4j_cfg) => {
            let store = Neo4jStore::connect(neo4j_cfg)
                .await
                .context("Error conectando a Neo4j")?;
            store
                .ensure_schema()
                .await
                .context("Error asegurando el esquema de Neo4j")?;
            Arc::new(store)
        }
        None => {
            warn!("NEO4J_URI no definido: se usa el almacén en memoria (los datos no persisten).");
            Arc::new(MemoryStore::new())
        }
    };

    // 4. LLM y cliente de la API para las páginas
    let llm_manager = LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?;
    let api_base = Url::parse(&cfg.api_base_url).context("API_BASE_URL inválida")?;
    let api_client = HttpRepoApi::new(api_base);

    tokio::fs::create_dir_all(&cfg.temp_dir)
        .await
        .with_context(|| format!("No se pudo crear {}", cfg.temp_dir.display()))?;

    // 5. Estado compartido y router
    let app_state = AppState::new(cfg.clone(), store, Arc::new(llm_manager), Arc::new(api_client));
    let app = build_app(app_state);

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // 7. Apagado ordenado con Ctrl-C
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
