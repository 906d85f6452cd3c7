//! End-to-end tests for the installation orchestrator

use super::*;
use crate::archive::fixtures::{corrupt, zip_bytes};
use crate::archive::ExtractError;
use crate::catalogue::{Catalogue, Dependency, DepotPin, ModDescriptor, ModId, ModVersion};
use crate::config::InstallerConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Launcher that records requests instead of starting anything
#[derive(Default)]
struct RecordingLauncher {
    requests: Mutex<Vec<LaunchRequest>>,
}

#[async_trait]
impl HostLauncher for RecordingLauncher {
    async fn launch(&self, request: &LaunchRequest) -> anyhow::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Provider whose base build is always ready
struct ReadyProvider {
    base: PathBuf,
}

#[async_trait]
impl BaseBuildProvider for ReadyProvider {
    async fn request(&self, _pin: &DepotPin) -> anyhow::Result<()> {
        Ok(())
    }

    async fn poll_ready(&self, _pin: &DepotPin) -> anyhow::Result<Option<PathBuf>> {
        Ok(Some(self.base.clone()))
    }
}

struct Harness {
    root: TempDir,
    server: MockServer,
    config: InstallerConfig,
    launcher: Arc<RecordingLauncher>,
    events: Arc<Mutex<Vec<InstallProgress>>>,
}

impl Harness {
    async fn new() -> Self {
        let root = tempdir().unwrap();
        let mut config = InstallerConfig::new(root.path().join("game"));
        config.temp_dir = Some(root.path().join("tmp"));
        config.depot.root = root.path().join("depots");
        config.depot.cache_dir = root.path().join("cache");
        config.depot.cache_backup_dir = root.path().join("cache.backup");
        config.depot.wait_timeout = Duration::from_secs(1);
        config.depot.poll_interval = Duration::from_millis(5);

        Self {
            root,
            server: MockServer::start().await,
            config,
            launcher: Arc::new(RecordingLauncher::default()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    async fn serve(&self, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    fn orchestrator(&self, mods: Vec<ModDescriptor>) -> Orchestrator {
        let events = self.events.clone();
        Orchestrator::new(self.config.clone(), Catalogue::new(mods).unwrap())
            .unwrap()
            .with_launcher(self.launcher.clone())
            .with_status(Arc::new(move |p: InstallProgress| events.lock().unwrap().push(p)))
    }

    /// Put a mod's files on disk and record it, as a previous session would have
    async fn preinstall(&self, id: &str, version: &str, files: &[(&str, &str)]) {
        let storage = self.config.storage_dir(id);
        for (name, content) in files {
            let target = storage.join(name);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, content).unwrap();
        }
        let mut state = InstallationState::load(&self.config.state_file).await.unwrap();
        state.record(&ModId::from(id), version);
        state.save(&self.config.state_file).await.unwrap();
    }

    fn phases(&self) -> Vec<InstallPhase> {
        self.events.lock().unwrap().iter().map(|e| e.phase).collect()
    }
}

fn plain(id: &str, url: String) -> ModDescriptor {
    ModDescriptor::new(id, format!("{} Mod", id)).with_version(ModVersion::new("1.0", url))
}

fn pin(manifest: &str) -> DepotPin {
    DepotPin { manifest_id: manifest.into(), version: format!("build-{}", manifest) }
}

#[tokio::test]
async fn test_install_puts_dependency_first_and_records_both() {
    let h = Harness::new().await;
    h.serve("/a.zip", zip_bytes(&[("A/", b""), ("A/A.dll", b"a"), ("A/A.cfg", b"a")])).await;
    h.serve("/b.zip", zip_bytes(&[("B.dll", b"b"), ("B.cfg", b"b")])).await;

    let orchestrator = h.orchestrator(vec![
        plain("A", h.url("/a.zip")).with_dependency(Dependency::on("B")),
        plain("B", h.url("/b.zip")),
    ]);
    orchestrator.load_state().await.unwrap();

    let report = orchestrator.install_mod(&ModId::from("A"), None, &[]).await.unwrap();

    assert_eq!(report.installed, vec![ModId::from("B"), ModId::from("A")]);
    assert!(h.config.storage_dir("A").join("A.dll").exists());
    assert!(h.config.storage_dir("B").join("B.cfg").exists());

    let persisted = InstallationState::load(&h.config.state_file).await.unwrap();
    assert_eq!(persisted.version_of(&ModId::from("A")), Some("1.0"));
    assert_eq!(persisted.version_of(&ModId::from("B")), Some("1.0"));

    let phases = h.phases();
    assert_eq!(phases.first(), Some(&InstallPhase::Resolving));
    assert_eq!(phases.last(), Some(&InstallPhase::Complete));
    assert!(phases.contains(&InstallPhase::Extracting));
}

#[tokio::test]
async fn test_installed_dependency_is_not_reinstalled() {
    let h = Harness::new().await;
    h.serve("/a.zip", zip_bytes(&[("A.dll", b"a"), ("A.cfg", b"a")])).await;
    h.preinstall("B", "1.0", &[("B.dll", "b")]).await;

    // Nothing serves /b.zip, so a second download of B would fail the install
    let orchestrator = h.orchestrator(vec![
        plain("A", h.url("/a.zip")).with_dependency(Dependency::on("B")),
        plain("B", h.url("/b.zip")),
    ]);
    orchestrator.load_state().await.unwrap();

    let report = orchestrator.install_mod(&ModId::from("A"), None, &[]).await.unwrap();
    assert_eq!(report.installed, vec![ModId::from("A")]);
}

#[tokio::test]
async fn test_uninstall_refused_while_dependent_installed() {
    let h = Harness::new().await;
    h.preinstall("B", "1.0", &[("B.dll", "b")]).await;
    h.preinstall("A", "1.0", &[("A.dll", "a")]).await;

    let orchestrator = h.orchestrator(vec![
        plain("A", h.url("/a.zip")).with_dependency(Dependency::on("B")),
        plain("B", h.url("/b.zip")),
    ]);
    orchestrator.load_state().await.unwrap();

    match orchestrator.uninstall_mod(&ModId::from("b")).await {
        Err(InstallError::HasDependents { mod_id, dependents }) => {
            assert_eq!(mod_id, ModId::from("B"));
            assert_eq!(dependents, vec![ModId::from("A")]);
        }
        other => panic!("Expected HasDependents, got {:?}", other),
    }
    assert!(h.config.storage_dir("B").join("B.dll").exists());

    orchestrator.uninstall_mod(&ModId::from("A")).await.unwrap();
    let report = orchestrator.uninstall_mod(&ModId::from("B")).await.unwrap();

    assert!(report.warnings.is_empty());
    assert!(!h.config.storage_dir("B").exists());
    assert!(orchestrator.state().await.is_empty());
}

#[tokio::test]
async fn test_uninstall_of_unknown_install_is_reported() {
    let h = Harness::new().await;
    let orchestrator = h.orchestrator(vec![plain("A", h.url("/a.zip"))]);

    let result = orchestrator.uninstall_mod(&ModId::from("A")).await;
    assert!(matches!(result, Err(InstallError::NotInstalled { .. })));
}

#[tokio::test]
async fn test_concurrent_install_is_rejected_without_writes() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/slow.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("Slow.dll", b"s"), ("Slow.cfg", b"s")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fast.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("Fast.dll", b"f"), ("Fast.cfg", b"f")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    let orchestrator = h.orchestrator(vec![plain("Slow", h.url("/slow.zip")), plain("Fast", h.url("/fast.zip"))]);

    let slow_id = ModId::from("Slow");
    let fast_id = ModId::from("Fast");
    let (slow, fast) = tokio::join!(
        orchestrator.install_mod(&slow_id, None, &[]),
        orchestrator.install_mod(&fast_id, None, &[]),
    );

    let (winner, loser) = match (&slow, &fast) {
        (Ok(_), Err(InstallError::AlreadyInProgress)) => ("Slow", "Fast"),
        (Err(InstallError::AlreadyInProgress), Ok(_)) => ("Fast", "Slow"),
        other => panic!("Expected exactly one rejection, got {:?}", other),
    };
    assert!(h.config.storage_dir(winner).exists());
    assert!(!h.config.storage_dir(loser).exists());

    let state = orchestrator.state().await;
    assert!(!state.is_installed(&ModId::from(loser)));
}

#[tokio::test]
async fn test_busy_lock_rejects_before_touching_disk() {
    let h = Harness::new().await;
    h.serve("/a.zip", zip_bytes(&[("A.dll", b"a"), ("A.cfg", b"a")])).await;
    let lock = InstallLock::new();
    let orchestrator = h.orchestrator(vec![plain("A", h.url("/a.zip"))]).with_lock(lock.clone());

    let _held = lock.try_acquire().unwrap();
    let result = orchestrator.install_mod(&ModId::from("A"), None, &[]).await;

    assert!(matches!(result, Err(InstallError::AlreadyInProgress)));
    assert!(!h.config.mods_root.exists());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_archive_leaves_clean_slate_for_retry() {
    let h = Harness::new().await;
    let good = zip_bytes(&[("X.dll", b"first"), ("X.cfg", b"PAYLOAD-OF-SECOND-ENTRY")]);
    let bad = corrupt(good.clone(), b"PAYLOAD-OF-SECOND-ENTRY");
    Mock::given(method("GET"))
        .and(path("/x.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bad))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    h.serve("/x.zip", good).await;

    let orchestrator = h.orchestrator(vec![plain("X", h.url("/x.zip"))]);

    let first = orchestrator.install_mod(&ModId::from("X"), None, &[]).await;
    match first {
        Err(InstallError::Extract { mod_id, source: ExtractError::CorruptEntry { entry, .. } }) => {
            assert_eq!(mod_id, ModId::from("X"));
            assert_eq!(entry, "X.cfg");
        }
        other => panic!("Expected CorruptEntry, got {:?}", other),
    }
    assert!(!h.config.storage_dir("X").exists());
    assert!(!orchestrator.state().await.is_installed(&ModId::from("X")));

    orchestrator.install_mod(&ModId::from("X"), None, &[]).await.unwrap();
    assert!(h.config.storage_dir("X").join("X.cfg").exists());
}

#[tokio::test]
async fn test_incompatible_selection_is_refused() {
    let h = Harness::new().await;
    let orchestrator = h.orchestrator(vec![
        plain("X", h.url("/x.zip")),
        plain("Y", h.url("/y.zip")).with_incompatible("X"),
    ]);

    let result = orchestrator
        .install_mod(&ModId::from("X"), None, &[ModId::from("Y")])
        .await;

    match result {
        Err(InstallError::IncompatibleWithSelection { conflict, .. }) => assert_eq!(conflict, ModId::from("Y")),
        other => panic!("Expected IncompatibleWithSelection, got {:?}", other),
    }
    assert!(!h.config.storage_dir("X").exists());
}

#[tokio::test]
async fn test_unknown_version_is_reported() {
    let h = Harness::new().await;
    let orchestrator = h.orchestrator(vec![plain("X", h.url("/x.zip"))]);

    let result = orchestrator.install_mod(&ModId::from("X"), Some("9.9"), &[]).await;
    assert!(matches!(result, Err(InstallError::UnknownVersion { .. })));
}

#[tokio::test]
async fn test_update_moves_to_newest_stable() {
    let h = Harness::new().await;
    h.serve("/m2.zip", zip_bytes(&[("M.dll", b"v2"), ("M.cfg", b"v2")])).await;
    h.preinstall("M", "1.0", &[("M.dll", "v1")]).await;

    let orchestrator = h.orchestrator(vec![
        ModDescriptor::new("M", "M")
            .with_version(ModVersion::new("1.0", h.url("/m1.zip")).with_released_at(100))
            .with_version(ModVersion::new("2.0", h.url("/m2.zip")).with_released_at(200))
            .with_version(
                ModVersion::new("3.0-rc", h.url("/m3.zip"))
                    .with_released_at(300)
                    .with_prerelease(true),
            ),
    ]);
    orchestrator.load_state().await.unwrap();

    match orchestrator.update_mod(&ModId::from("M")).await.unwrap() {
        UpdateOutcome::Updated { from, to, .. } => {
            assert_eq!(from, "1.0");
            assert_eq!(to, "2.0");
        }
        other => panic!("Expected an update, got {:?}", other),
    }
    assert_eq!(std::fs::read(h.config.storage_dir("M").join("M.dll")).unwrap(), b"v2");

    assert_eq!(
        orchestrator.update_mod(&ModId::from("M")).await.unwrap(),
        UpdateOutcome::UpToDate { version: "2.0".into() }
    );
}

#[tokio::test]
async fn test_load_state_forgets_deleted_mods() {
    let h = Harness::new().await;
    h.preinstall("Kept", "1.0", &[("Kept.dll", "k")]).await;
    h.preinstall("Gone", "1.0", &[("Gone.dll", "g")]).await;
    std::fs::remove_dir_all(h.config.storage_dir("Gone")).unwrap();

    let orchestrator = h.orchestrator(vec![]);
    let pruned = orchestrator.load_state().await.unwrap();

    assert_eq!(pruned, vec![ModId::from("Gone")]);
    let persisted = InstallationState::load(&h.config.state_file).await.unwrap();
    assert!(persisted.is_installed(&ModId::from("Kept")));
    assert!(!persisted.is_installed(&ModId::from("Gone")));
}

#[tokio::test]
async fn test_primary_launch_deploys_selection_with_dependencies() {
    let h = Harness::new().await;
    h.serve(
        "/full.zip",
        zip_bytes(&[("BepInEx/plugins/Full.dll", b"f"), ("BepInEx/config/Full.cfg", b"c")]),
    )
    .await;
    h.serve("/Lite.dll", b"MZ-lite".to_vec()).await;

    let orchestrator = h.orchestrator(vec![
        plain("Full", h.url("/full.zip")).with_dependency(Dependency::on("Lite")),
        plain("Lite", h.url("/Lite.dll")),
    ]);
    orchestrator.install_mod(&ModId::from("Full"), None, &[]).await.unwrap();

    let report = orchestrator.launch_with_mods(&[ModId::from("Full")]).await.unwrap();

    let game = &h.config.game_root;
    assert!(game.join("BepInEx/plugins/Full.dll").exists());
    assert!(game.join("BepInEx/config/Full.cfg").exists());
    assert_eq!(std::fs::read(game.join("BepInEx/plugins/Lite.dll")).unwrap(), b"MZ-lite");
    assert!(matches!(report.target, PreparedTarget::Primary(_)));
    assert_eq!(report.request.mods, vec![ModId::from("Lite"), ModId::from("Full")]);
    assert_eq!(report.request.working_dir, *game);
    assert_eq!(report.request.executable, game.join(&h.config.host_executable));
    assert_eq!(h.launcher.requests.lock().unwrap().len(), 1);

    // Launching with nothing selected removes the previous deployment
    orchestrator.launch_with_mods(&[]).await.unwrap();
    assert!(!game.join("BepInEx/plugins/Lite.dll").exists());
    assert!(!game.join("BepInEx/plugins/Full.dll").exists());
}

#[tokio::test]
async fn test_launch_requires_installed_conflict_free_selection() {
    let h = Harness::new().await;
    h.preinstall("X", "1.0", &[("X.dll", "x")]).await;
    h.preinstall("Y", "1.0", &[("Y.dll", "y")]).await;
    let orchestrator = h.orchestrator(vec![
        plain("X", h.url("/x.zip")).with_incompatible("Y"),
        plain("Y", h.url("/y.zip")),
        plain("Z", h.url("/z.zip")),
    ]);
    orchestrator.load_state().await.unwrap();

    let conflict = orchestrator.launch_with_mods(&[ModId::from("X"), ModId::from("Y")]).await;
    assert!(matches!(conflict, Err(InstallError::IncompatibleWithSelection { .. })));

    let missing = orchestrator.launch_with_mods(&[ModId::from("Z")]).await;
    assert!(matches!(missing, Err(InstallError::NotInstalled { .. })));
    assert!(h.launcher.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_depot_selection_rules() {
    let h = Harness::new().await;
    h.preinstall("Old", "1.0", &[("Old.dll", "o")]).await;
    h.preinstall("Older", "1.0", &[("Older.dll", "o")]).await;
    h.preinstall("Current", "1.0", &[("Current.dll", "c")]).await;
    let orchestrator = h.orchestrator(vec![
        plain("Old", h.url("/old.zip")).with_depot(pin("111")),
        plain("Older", h.url("/older.zip")).with_depot(pin("222")),
        plain("Current", h.url("/current.zip")),
    ]);
    orchestrator.load_state().await.unwrap();

    let mixed = orchestrator
        .launch_with_mods(&[ModId::from("Old"), ModId::from("Current")])
        .await;
    assert!(matches!(mixed, Err(InstallError::UnsupportedSelection { .. })));

    let different = orchestrator
        .launch_with_mods(&[ModId::from("Old"), ModId::from("Older")])
        .await;
    assert!(matches!(different, Err(InstallError::UnsupportedSelection { .. })));

    // No provider configured
    let unconfigured = orchestrator.launch_with_mods(&[ModId::from("Old")]).await;
    assert!(matches!(unconfigured, Err(InstallError::UnsupportedSelection { .. })));
    assert!(!h.config.depot.root.exists());
}

#[tokio::test]
async fn test_depot_launch_prepares_working_copy() {
    let h = Harness::new().await;
    let base = h.root.path().join("base-build");
    std::fs::create_dir_all(base.join("Game_Data")).unwrap();
    std::fs::write(base.join("Game_Data/level0"), "level").unwrap();
    std::fs::write(base.join("config.txt"), "base").unwrap();
    std::fs::create_dir_all(h.config.depot.cache_dir.join("shaders")).unwrap();
    std::fs::write(h.config.depot.cache_dir.join("shaders/cache.bin"), "stale").unwrap();

    h.preinstall("Old", "1.0", &[("config.txt", "old-mod"), ("BepInEx/plugins/Old.dll", "o")]).await;
    h.preinstall("Helper", "1.0", &[("BepInEx/plugins/Helper.dll", "h")]).await;

    let orchestrator = h
        .orchestrator(vec![
            plain("Old", h.url("/old.zip"))
                .with_depot(pin("111"))
                .with_dependency(Dependency::on("Helper")),
            plain("Helper", h.url("/helper.zip")),
        ])
        .with_base_build_provider(Arc::new(ReadyProvider { base: base.clone() }));
    orchestrator.load_state().await.unwrap();

    let report = orchestrator.launch_with_mods(&[ModId::from("Old")]).await.unwrap();

    let working = h.config.depot.working_dir("Old");
    match &report.target {
        PreparedTarget::Depot { outcome, cache } => {
            assert_eq!(outcome.path, working);
            assert_eq!(outcome.stages.last(), Some(&DepotStage::Ready));
            assert_eq!(cache.len(), 2);
            assert!(matches!(cache[0], CacheAction::BackedUp { .. }));
            assert!(matches!(cache[1], CacheAction::Deleted { .. }));
        }
        other => panic!("Expected a depot launch, got {:?}", other),
    }
    assert_eq!(std::fs::read_to_string(working.join("config.txt")).unwrap(), "old-mod");
    assert!(working.join("Game_Data/level0").exists());
    assert!(working.join("BepInEx/plugins/Helper.dll").exists());
    assert!(!h.config.depot.cache_dir.exists());
    assert!(h.config.depot.cache_backup_dir.join("shaders/cache.bin").exists());
    assert_eq!(report.request.working_dir, working);
    assert_eq!(report.request.depot, Some(pin("111")));
    assert!(base.join("config.txt").exists());
    assert!(!Path::new(&h.config.game_root).join("BepInEx").exists());
}

#[tokio::test]
async fn test_install_of_pinned_mod_builds_depot_copy() {
    let h = Harness::new().await;
    let base = h.root.path().join("base-build");
    std::fs::create_dir_all(&base).unwrap();
    std::fs::write(base.join("config.txt"), "base").unwrap();
    h.serve("/old1.zip", zip_bytes(&[("config.txt", b"v1"), ("Old.dll", b"o")])).await;
    h.serve("/old2.zip", zip_bytes(&[("config.txt", b"v2"), ("Old.dll", b"o")])).await;

    let orchestrator = h
        .orchestrator(vec![
            ModDescriptor::new("Old", "Old")
                .with_version(ModVersion::new("1.0", h.url("/old1.zip")).with_released_at(1))
                .with_depot(pin("111")),
        ])
        .with_base_build_provider(Arc::new(ReadyProvider { base }));

    let report = orchestrator.install_mod(&ModId::from("Old"), Some("1.0"), &[]).await.unwrap();

    let working = h.config.depot.working_dir("Old");
    let outcome = report.depot.expect("pinned install prepares a depot copy");
    assert_eq!(outcome.path, working);
    assert_eq!(outcome.stages.last(), Some(&DepotStage::Ready));
    assert_eq!(std::fs::read_to_string(working.join("config.txt")).unwrap(), "v1");

    // An update refreshes the overlay without waiting for the next launch
    let mut orchestrator = orchestrator;
    orchestrator.replace_catalogue(
        Catalogue::new(vec![
            ModDescriptor::new("Old", "Old")
                .with_version(ModVersion::new("1.0", h.url("/old1.zip")).with_released_at(1))
                .with_version(ModVersion::new("2.0", h.url("/old2.zip")).with_released_at(2))
                .with_depot(pin("111")),
        ])
        .unwrap(),
    );
    match orchestrator.update_mod(&ModId::from("Old")).await.unwrap() {
        UpdateOutcome::Updated { report, .. } => {
            let outcome = report.depot.unwrap();
            assert!(outcome.reused_copy);
            assert_eq!(outcome.stages.last(), Some(&DepotStage::Ready));
        }
        other => panic!("Expected an update, got {:?}", other),
    }
    assert_eq!(std::fs::read_to_string(working.join("config.txt")).unwrap(), "v2");
}

#[tokio::test]
async fn test_install_of_pinned_mod_reports_unavailable_build() {
    struct NeverReady;

    #[async_trait]
    impl BaseBuildProvider for NeverReady {
        async fn request(&self, _pin: &DepotPin) -> anyhow::Result<()> {
            Ok(())
        }

        async fn poll_ready(&self, _pin: &DepotPin) -> anyhow::Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    let mut h = Harness::new().await;
    h.config.depot.wait_timeout = Duration::from_millis(50);
    h.serve("/old.zip", zip_bytes(&[("config.txt", b"v1"), ("Old.dll", b"o")])).await;
    let orchestrator = h
        .orchestrator(vec![plain("Old", h.url("/old.zip")).with_depot(pin("111"))])
        .with_base_build_provider(Arc::new(NeverReady));

    let result = orchestrator.install_mod(&ModId::from("Old"), None, &[]).await;

    match result {
        Err(InstallError::Depot { mod_id, source: DepotError::BaseBuildUnavailable { .. } }) => {
            assert_eq!(mod_id, ModId::from("Old"));
        }
        other => panic!("Expected BaseBuildUnavailable, got {:?}", other),
    }
    assert!(!h.config.depot.working_dir("Old").exists());
}

#[tokio::test]
async fn test_ids_that_are_not_folders_never_touch_storage() {
    let h = Harness::new().await;
    h.preinstall("Keep", "1.0", &[("Keep.dll", "k")]).await;

    let rejected = Catalogue::new(vec![plain(".", h.url("/dot.zip")), plain("Keep", h.url("/keep.zip"))]);
    assert!(matches!(rejected, Err(crate::catalogue::CatalogueError::InvalidId { .. })));

    // A hand-edited state file naming the storage root itself
    let mut state = InstallationState::load(&h.config.state_file).await.unwrap();
    state.record(&ModId::from("."), "1.0");
    state.save(&h.config.state_file).await.unwrap();

    let orchestrator = h.orchestrator(vec![plain("Keep", h.url("/keep.zip"))]);
    let pruned = orchestrator.load_state().await.unwrap();
    assert_eq!(pruned, vec![ModId::from(".")]);

    let result = orchestrator.uninstall_mod(&ModId::from(".")).await;
    assert!(matches!(result, Err(InstallError::NotInstalled { .. })));
    assert!(h.config.storage_dir("Keep").join("Keep.dll").exists());
    assert!(h.config.state_file.exists());
    assert!(orchestrator.state().await.is_installed(&ModId::from("Keep")));
}
