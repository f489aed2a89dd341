use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::{
    config::{ExerciseCatalog, ExerciseConfig, TriggerCatalog},
    db::Database,
    error::EngineError,
    insights::{self, InsightsSummary},
    persistence::{AnalyticsSink, LogAnalytics, NullSink, SnapshotSaver},
    session::{Collaborators, SessionContext, SessionStateMachine},
    settings::{EngineSettings, SettingsStore},
    timer::{Clock, SystemClock},
};

const TOP_TRIGGERS: usize = 5;

/// App-level wiring: settings, session store, snapshot saver, exercise and
/// trigger catalogs. Screens ask it for new sessions.
pub struct Engine {
    settings: SettingsStore,
    db: Database,
    saver: Arc<SnapshotSaver>,
    analytics: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    catalog: ExerciseCatalog,
    triggers: TriggerCatalog,
}

impl Engine {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        Self::open_with_clock(data_dir, Arc::new(SystemClock)).await
    }

    /// Must be called from within a tokio runtime.
    pub async fn open_with_clock(data_dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let current = settings.settings();

        let db = Database::new(data_dir.join(&current.database_file))?;

        // Sessions whose final snapshot never landed (app killed mid-exercise).
        let recovered = recover_incomplete_sessions(&db, clock.as_ref()).await?;
        if recovered > 0 {
            warn!("Recovered {recovered} incomplete sessions; marked as abandoned");
        }

        let catalog = load_catalog(data_dir, &current);
        let triggers = load_triggers(data_dir);

        let analytics: Arc<dyn AnalyticsSink> = if current.analytics_enabled {
            Arc::new(LogAnalytics)
        } else {
            Arc::new(NullSink)
        };

        let saver = Arc::new(SnapshotSaver::spawn(db.clone(), current.snapshot_debounce()));

        info!(
            "Engine ready: {} exercises, {} trigger categories",
            catalog.len(),
            triggers.categories().len()
        );

        Ok(Self {
            settings,
            db,
            saver,
            analytics,
            clock,
            catalog,
            triggers,
        })
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    pub fn triggers(&self) -> &TriggerCatalog {
        &self.triggers
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings.settings()
    }

    pub fn saver(&self) -> &SnapshotSaver {
        &self.saver
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            sink: self.saver.clone(),
            analytics: self.analytics.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn start_session(
        &self,
        config_id: &str,
        context: SessionContext,
    ) -> Result<SessionStateMachine> {
        let config = self
            .catalog
            .get(config_id)
            .ok_or_else(|| anyhow!("unknown exercise '{config_id}'"))?;
        Ok(self.start_with_config(config, context)?)
    }

    pub fn start_with_config(
        &self,
        config: Arc<ExerciseConfig>,
        context: SessionContext,
    ) -> std::result::Result<SessionStateMachine, EngineError> {
        SessionStateMachine::start(config, context, self.collaborators())
    }

    pub async fn insights(&self, limit: usize) -> Result<InsightsSummary> {
        insights::load_insights(&self.db, limit, TOP_TRIGGERS).await
    }

    /// Flush pending snapshots and stop the saver.
    pub async fn shutdown(&self) -> Result<()> {
        self.saver.shutdown().await
    }
}

pub async fn recover_incomplete_sessions(db: &Database, clock: &dyn Clock) -> Result<usize> {
    let incomplete = db.get_incomplete_sessions().await?;
    let now = clock.now();
    for stored in &incomplete {
        warn!(
            "Recovered incomplete session {} at stage {}",
            stored.snapshot.session_id, stored.snapshot.current_stage
        );
        db.mark_session_abandoned(&stored.snapshot.session_id, now)
            .await?;
    }
    Ok(incomplete.len())
}

fn load_catalog(data_dir: &Path, settings: &EngineSettings) -> ExerciseCatalog {
    let mut catalog = ExerciseCatalog::builtin();
    if let Some(dir) = &settings.exercises_dir {
        if let Err(err) = catalog.load_dir(&data_dir.join(dir)) {
            warn!("Failed to load custom exercises: {err:#}");
        }
    }
    catalog
}

fn load_triggers(data_dir: &Path) -> TriggerCatalog {
    let path = data_dir.join("triggers.json");
    if !path.exists() {
        return TriggerCatalog::default();
    }

    std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|json| TriggerCatalog::from_json(&json))
        .unwrap_or_else(|err| {
            warn!("Using default trigger catalog; {} is unusable: {err:#}", path.display());
            TriggerCatalog::default()
        })
}
