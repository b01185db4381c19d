//! Push-to-talk
//!
//! Les touches PTT sont lues directement dans `/dev/input/event*` (evdev),
//! ce qui fonctionne sous X11 comme sous Wayland. Chaque appui ou relâchement
//! produit un `PttEvent` ; `PttState` garde l'état courant des deux radios.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::settings::KeybindSettings;
use crate::CoreResult;

/// Commande push-to-talk logique
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttControl {
    Ptt1,
    Ptt2,
}

impl PttControl {
    /// Numéro de la radio commandée
    pub fn radio(self) -> u8 {
        match self {
            PttControl::Ptt1 => 1,
            PttControl::Ptt2 => 2,
        }
    }
}

/// Appui ou relâchement d'une touche PTT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PttEvent {
    pub control: PttControl,
    pub pressed: bool,
}

impl PttEvent {
    pub fn new(control: PttControl, pressed: bool) -> Self {
        Self { control, pressed }
    }
}

/// État des deux PTT, partagé entre la source d'événements et l'envoi voix
#[derive(Debug, Default)]
pub struct PttState {
    radio1_active: AtomicBool,
    radio2_active: AtomicBool,
}

impl PttState {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, control: PttControl) -> &AtomicBool {
        match control {
            PttControl::Ptt1 => &self.radio1_active,
            PttControl::Ptt2 => &self.radio2_active,
        }
    }

    /// Applique un événement ; retourne true si l'état a changé
    pub fn apply(&self, event: PttEvent) -> bool {
        self.flag(event.control).swap(event.pressed, Ordering::SeqCst) != event.pressed
    }

    pub fn is_active(&self, control: PttControl) -> bool {
        self.flag(control).load(Ordering::SeqCst)
    }

    /// Radios en émission, radio 1 d'abord
    ///
    /// L'état est lu une seule fois : l'itérateur ne voit pas les changements
    /// ultérieurs.
    pub fn active_radios(&self) -> impl Iterator<Item = u8> + Send + 'static {
        let snapshot = [
            (1u8, self.is_active(PttControl::Ptt1)),
            (2u8, self.is_active(PttControl::Ptt2)),
        ];
        snapshot.into_iter().filter(|(_, active)| *active).map(|(radio, _)| radio)
    }

    /// Relâche les deux radios
    pub fn reset(&self) {
        self.radio1_active.store(false, Ordering::SeqCst);
        self.radio2_active.store(false, Ordering::SeqCst);
    }
}

/// Codes evdev des touches PTT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyBindings {
    pub ptt1: Option<u16>,
    pub ptt2: Option<u16>,
}

impl KeyBindings {
    /// Résout les noms de touches de la configuration
    ///
    /// Un nom inconnu désactive la touche correspondante.
    pub fn from_settings(keybinds: &KeybindSettings) -> Self {
        Self {
            ptt1: parse_key_name(&keybinds.ptt1),
            ptt2: parse_key_name(&keybinds.ptt2),
        }
    }

    /// Traduit un événement brut (code, valeur) en événement PTT
    ///
    /// Valeur 1 = appui, 0 = relâchement ; la répétition (2) est ignorée.
    /// Le code est comparé quel que soit le type d'événement : certaines
    /// manettes envoient leurs boutons virtuels hors `EV_KEY`.
    pub fn translate(&self, code: u16, value: i32) -> Option<PttEvent> {
        let pressed = match value {
            1 => true,
            0 => false,
            _ => return None,
        };

        if Some(code) == self.ptt1 {
            Some(PttEvent::new(PttControl::Ptt1, pressed))
        } else if Some(code) == self.ptt2 {
            Some(PttEvent::new(PttControl::Ptt2, pressed))
        } else {
            None
        }
    }
}

#[cfg(target_os = "linux")]
fn parse_key_name(name: &str) -> Option<u16> {
    use std::str::FromStr;

    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match evdev::Key::from_str(name) {
        Ok(key) => Some(key.code()),
        Err(_) => {
            tracing::warn!(key = name, "Touche inconnue d'evdev, ignorée");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn parse_key_name(name: &str) -> Option<u16> {
    if !name.trim().is_empty() {
        tracing::warn!(key = name, "Touches PTT non supportées sur cette plateforme");
    }
    None
}

/// Source d'événements PTT
#[async_trait]
pub trait PttEventSource: Send {
    /// Démarre la surveillance ; les événements arrivent sur `events`
    async fn start(&mut self, events: mpsc::Sender<PttEvent>) -> CoreResult<()>;

    /// Arrête la surveillance ; sans effet si déjà arrêtée
    async fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Source alimentée par un canal (tests, plateformes sans evdev)
pub struct ChannelPttSource {
    input: Option<mpsc::Receiver<PttEvent>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ChannelPttSource {
    pub fn new(input: mpsc::Receiver<PttEvent>) -> Self {
        Self { input: Some(input), task: None }
    }

    /// Source qui ne produit jamais d'événement
    pub fn silent() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self::new(rx)
    }
}

#[async_trait]
impl PttEventSource for ChannelPttSource {
    async fn start(&mut self, events: mpsc::Sender<PttEvent>) -> CoreResult<()> {
        let Some(mut input) = self.input.take() else {
            return Ok(());
        };
        self.task = Some(tokio::spawn(async move {
            while let Some(event) = input.recv().await {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[cfg(target_os = "linux")]
pub use evdev_source::EvdevPttSource;

#[cfg(target_os = "linux")]
mod evdev_source {
    use super::*;
    use std::collections::HashSet;
    use std::io::ErrorKind;
    use std::path::PathBuf;
    use tokio::task::{JoinHandle, JoinSet};
    use tokio::time::Duration;

    use crate::CoreError;

    const INPUT_DIR: &str = "/dev/input";

    /// Intervalle de recherche des périphériques branchés à chaud
    const RESCAN_INTERVAL: Duration = Duration::from_secs(5);

    /// Source PTT lisant les périphériques evdev
    pub struct EvdevPttSource {
        bindings: KeyBindings,
        task: Option<JoinHandle<()>>,
    }

    /// Résultat d'un scan de `/dev/input`
    struct Scan {
        opened: Vec<(PathBuf, evdev::Device)>,
        permission_denied: bool,
    }

    impl EvdevPttSource {
        pub fn new(bindings: KeyBindings) -> Self {
            Self { bindings, task: None }
        }

        pub fn from_settings(keybinds: &KeybindSettings) -> Self {
            Self::new(KeyBindings::from_settings(keybinds))
        }

        pub fn bindings(&self) -> KeyBindings {
            self.bindings
        }
    }

    /// Ouvre les périphériques `event*` pas encore surveillés
    fn scan_devices(known: &HashSet<PathBuf>) -> Scan {
        let mut scan = Scan { opened: Vec::new(), permission_denied: false };

        let entries = match std::fs::read_dir(INPUT_DIR) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Impossible de lister {}", INPUT_DIR);
                scan.permission_denied = e.kind() == ErrorKind::PermissionDenied;
                return scan;
            }
        };

        for path in entries.flatten().map(|entry| entry.path()) {
            let is_event = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("event"));
            if !is_event || known.contains(&path) {
                continue;
            }

            match evdev::Device::open(&path) {
                Ok(device) => scan.opened.push((path, device)),
                Err(e) if e.kind() == ErrorKind::PermissionDenied => scan.permission_denied = true,
                // Débranché pendant l'ouverture
                Err(_) => {}
            }
        }
        scan
    }

    fn spawn_readers(
        scan: Scan,
        known: &mut HashSet<PathBuf>,
        readers: &mut JoinSet<PathBuf>,
        bindings: KeyBindings,
        events: &mpsc::Sender<PttEvent>,
    ) {
        for (path, device) in scan.opened {
            let name = device.name().unwrap_or("inconnu").to_string();
            match device.into_event_stream() {
                Ok(stream) => {
                    tracing::info!(device = %name, path = %path.display(), "Surveillance du périphérique");
                    known.insert(path.clone());
                    readers.spawn(read_device(path, name, stream, bindings, events.clone()));
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Périphérique ignoré");
                }
            }
        }
    }

    /// Lit un périphérique jusqu'à sa déconnexion ; retourne son chemin
    async fn read_device(
        path: PathBuf,
        name: String,
        mut stream: evdev::EventStream,
        bindings: KeyBindings,
        events: mpsc::Sender<PttEvent>,
    ) -> PathBuf {
        loop {
            match stream.next_event().await {
                Ok(event) => {
                    tracing::trace!(
                        device = %name,
                        kind = ?event.event_type(),
                        code = event.code(),
                        value = event.value(),
                        "Événement"
                    );
                    if let Some(ptt) = bindings.translate(event.code(), event.value()) {
                        if events.send(ptt).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::info!(device = %name, error = %e, "Périphérique déconnecté");
                    break;
                }
            }
        }
        path
    }

    async fn monitor(
        mut known: HashSet<PathBuf>,
        mut readers: JoinSet<PathBuf>,
        bindings: KeyBindings,
        events: mpsc::Sender<PttEvent>,
    ) {
        let mut rescan = tokio::time::interval(RESCAN_INTERVAL);
        rescan.tick().await;

        loop {
            tokio::select! {
                _ = rescan.tick() => {
                    let scan = scan_devices(&known);
                    spawn_readers(scan, &mut known, &mut readers, bindings, &events);
                    if known.is_empty() {
                        tracing::debug!("Aucun périphérique d'entrée, nouvelle recherche dans 5s");
                    }
                }
                Some(done) = readers.join_next() => {
                    if let Ok(path) = done {
                        known.remove(&path);
                    }
                }
            }
            if events.is_closed() {
                break;
            }
        }
    }

    #[async_trait]
    impl PttEventSource for EvdevPttSource {
        async fn start(&mut self, events: mpsc::Sender<PttEvent>) -> CoreResult<()> {
            if self.task.is_some() {
                return Ok(());
            }
            if self.bindings.ptt1.is_none() && self.bindings.ptt2.is_none() {
                tracing::warn!("Aucune touche PTT configurée");
            }

            let mut known = HashSet::new();
            let mut readers = JoinSet::new();
            let scan = scan_devices(&known);
            let denied = scan.permission_denied;
            spawn_readers(scan, &mut known, &mut readers, self.bindings, &events);

            if known.is_empty() && denied {
                return Err(CoreError::InputPermission);
            }
            if known.is_empty() {
                tracing::warn!("Aucun périphérique d'entrée trouvé, en attente...");
            }

            tracing::info!(devices = known.len(), "Surveillance des touches démarrée");
            self.task = Some(tokio::spawn(monitor(known, readers, self.bindings, events)));
            Ok(())
        }

        async fn stop(&mut self) {
            if let Some(task) = self.task.take() {
                // Les lecteurs sont arrêtés avec le JoinSet
                task.abort();
                tracing::info!("Surveillance des touches arrêtée");
            }
        }

        fn is_running(&self) -> bool {
            self.task.as_ref().is_some_and(|task| !task.is_finished())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_ptt_state() {
        let state = PttState::new();
        assert_eq!(state.active_radios().count(), 0);

        assert!(state.apply(PttEvent::new(PttControl::Ptt2, true)));
        assert!(!state.apply(PttEvent::new(PttControl::Ptt2, true)));
        assert_eq!(state.active_radios().collect::<Vec<_>>(), vec![2]);

        state.apply(PttEvent::new(PttControl::Ptt1, true));
        assert_eq!(state.active_radios().collect::<Vec<_>>(), vec![1, 2]);

        state.apply(PttEvent::new(PttControl::Ptt1, false));
        assert!(!state.is_active(PttControl::Ptt1));
        assert!(state.is_active(PttControl::Ptt2));

        state.reset();
        assert_eq!(state.active_radios().count(), 0);
    }

    #[test]
    fn test_translate() {
        let bindings = KeyBindings { ptt1: Some(36), ptt2: Some(37) };

        assert_eq!(bindings.translate(36, 1), Some(PttEvent::new(PttControl::Ptt1, true)));
        assert_eq!(bindings.translate(36, 0), Some(PttEvent::new(PttControl::Ptt1, false)));
        assert_eq!(bindings.translate(37, 1), Some(PttEvent::new(PttControl::Ptt2, true)));
        // Répétition ignorée
        assert_eq!(bindings.translate(36, 2), None);
        // Touche non liée
        assert_eq!(bindings.translate(38, 1), None);

        let unbound = KeyBindings::default();
        assert_eq!(unbound.translate(0, 1), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_key_names() {
        let bindings = KeyBindings::from_settings(&KeybindSettings::default());
        assert_eq!(bindings.ptt1, Some(36)); // KEY_J
        assert_eq!(bindings.ptt2, Some(37)); // KEY_K

        let custom = KeybindSettings { ptt1: "BTN_TRIGGER".into(), ptt2: "PAS_UNE_TOUCHE".into() };
        let bindings = KeyBindings::from_settings(&custom);
        assert_eq!(bindings.ptt1, Some(0x120));
        assert_eq!(bindings.ptt2, None);

        let empty = KeybindSettings { ptt1: String::new(), ptt2: " ".into() };
        assert_eq!(KeyBindings::from_settings(&empty), KeyBindings::default());
    }

    #[tokio::test]
    async fn test_channel_source_forwards_events() {
        let (input_tx, input_rx) = mpsc::channel(4);
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let mut source = ChannelPttSource::new(input_rx);

        source.start(events_tx).await.unwrap();
        assert!(source.is_running());

        input_tx.send(PttEvent::new(PttControl::Ptt1, true)).await.unwrap();
        let event = timeout(Duration::from_secs(1), events_rx.recv()).await.unwrap();
        assert_eq!(event, Some(PttEvent::new(PttControl::Ptt1, true)));

        source.stop().await;
        source.stop().await;
        assert!(!source.is_running());
    }

    // Nécessite l'accès à /dev/input
    #[cfg(target_os = "linux")]
    #[tokio::test]
    #[ignore]
    async fn test_evdev_source_starts() {
        let mut source = EvdevPttSource::from_settings(&KeybindSettings::default());
        let (tx, _rx) = mpsc::channel(4);
        source.start(tx).await.expect("Accès aux périphériques");
        assert!(source.is_running());
        source.stop().await;
    }
}
