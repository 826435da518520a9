#[cxx::bridge(namespace = "btbridge")]
/// Native bridge types and functions exposed to Rust.
pub mod ffi {
    /// Settings applied when the native session is constructed.
    #[derive(Debug)]
    struct NativeSettings {
        /// Listen port; `0` lets libtorrent choose.
        listen_port: u16,
        /// Whether to enable DHT.
        enable_dht: bool,
        /// Whether to enable local service discovery.
        enable_lsd: bool,
        /// Whether to enable `UPnP` port mappings.
        enable_upnp: bool,
        /// Whether to enable NAT-PMP port mappings.
        enable_natpmp: bool,
        /// Session download cap in bytes per second, `0` for unlimited.
        download_rate_limit: i32,
        /// Session upload cap in bytes per second, `0` for unlimited.
        upload_rate_limit: i32,
    }

    /// Request to register a transfer.
    #[derive(Debug)]
    struct NativeAddRequest {
        /// Whether `source` is a magnet URI rather than a descriptor path.
        is_magnet: bool,
        /// Magnet URI or descriptor path.
        source: String,
        /// Directory the payload is written to.
        save_path: String,
        /// Resume blob, empty when absent.
        resume_data: Vec<u8>,
    }

    /// Outcome of an add request.
    #[derive(Debug)]
    struct NativeAddResult {
        /// Shim-assigned transfer id.
        torrent: u64,
        /// Hex identity, v2 preferred.
        identity: String,
        /// Error message, empty on success.
        error: String,
    }

    /// Raw status of one transfer.
    #[derive(Debug)]
    struct NativeStatus {
        /// Shim-assigned transfer id.
        torrent: u64,
        /// Hex identity.
        identity: String,
        /// Display name.
        name: String,
        /// Completion fraction.
        progress: f64,
        /// Download rate in bytes per second.
        download_rate: i64,
        /// Upload rate in bytes per second.
        upload_rate: i64,
        /// Cumulative payload bytes downloaded.
        total_downloaded: i64,
        /// Cumulative payload bytes uploaded.
        total_uploaded: i64,
        /// Connected peers.
        num_peers: i32,
        /// Connected seeds.
        num_seeds: i32,
        /// libtorrent state ordinal.
        state: i32,
        /// Whether metadata is known.
        has_metadata: bool,
        /// Error message, empty on success.
        error: String,
    }

    /// One file from the transfer metadata.
    #[derive(Debug)]
    struct NativeFile {
        /// Relative path.
        path: String,
        /// Size in bytes.
        size: i64,
        /// Offset within the payload.
        offset: i64,
    }

    /// Metadata lookup result.
    #[derive(Debug)]
    struct NativeMetadata {
        /// Whether metadata is known yet.
        has_metadata: bool,
        /// Display name.
        name: String,
        /// Files in descriptor order.
        files: Vec<NativeFile>,
        /// Error message, empty on success.
        error: String,
    }

    /// Priority lookup result.
    #[derive(Debug)]
    struct NativePriorities {
        /// Per-file priority ordinals.
        priorities: Vec<u8>,
        /// Error message, empty on success.
        error: String,
    }

    /// Alert kinds translated by the shim.
    #[derive(Debug)]
    enum NativeEventKind {
        /// `state_update_alert`.
        StateUpdate,
        /// `save_resume_data_alert`.
        ResumeDataReady,
        /// `save_resume_data_failed_alert`.
        ResumeDataFailed,
        /// `torrent_finished_alert`.
        TorrentFinished,
        /// `torrent_error_alert`.
        TorrentError,
        /// `metadata_received_alert`.
        MetadataReceived,
        /// `tracker_error_alert`.
        TrackerError,
        /// `add_torrent_alert`.
        TorrentAdded,
        /// `torrent_removed_alert`.
        TorrentRemoved,
        /// `state_changed_alert`.
        StateChanged,
        /// `storage_moved_alert`.
        StorageMoved,
        /// Any other alert.
        Log,
    }

    /// Flattened alert.
    #[derive(Debug)]
    struct NativeEvent {
        /// Alert kind.
        kind: NativeEventKind,
        /// Shim-assigned transfer id, when the alert refers to one.
        torrent: u64,
        /// Hex identity, empty when the alert refers to no transfer.
        identity: String,
        /// Error code for error alerts.
        code: i32,
        /// Alert message or storage path.
        message: String,
        /// Resume blob for `ResumeDataReady`.
        payload: Vec<u8>,
        /// State ordinal for `StateChanged`.
        state: i32,
        /// Statuses for `StateUpdate`.
        statuses: Vec<NativeStatus>,
    }

    unsafe extern "C++" {
        include!("btbridge/session.hpp");

        /// Opaque handle to the native libtorrent session.
        type Session;

        /// Create a session, returning null when libtorrent refuses the settings.
        #[must_use]
        fn new_session(settings: &NativeSettings) -> UniquePtr<Session>;
        /// Register a transfer.
        #[must_use]
        fn add_torrent(self: Pin<&mut Session>, request: &NativeAddRequest) -> NativeAddResult;
        /// Remove a transfer and optionally its data.
        #[must_use]
        fn remove_torrent(self: Pin<&mut Session>, torrent: u64, delete_data: bool) -> String;
        /// Pause a transfer.
        #[must_use]
        fn pause_torrent(self: Pin<&mut Session>, torrent: u64) -> String;
        /// Resume a transfer.
        #[must_use]
        fn resume_torrent(self: Pin<&mut Session>, torrent: u64) -> String;
        /// Announce to every tracker now.
        #[must_use]
        fn force_reannounce(self: Pin<&mut Session>, torrent: u64) -> String;
        /// Current status.
        #[must_use]
        fn torrent_status(self: &Session, torrent: u64) -> NativeStatus;
        /// Current metadata.
        #[must_use]
        fn torrent_metadata(self: &Session, torrent: u64) -> NativeMetadata;
        /// Per-file priorities.
        #[must_use]
        fn file_priorities(self: &Session, torrent: u64) -> NativePriorities;
        /// Set one file priority.
        #[must_use]
        fn set_file_priority(
            self: Pin<&mut Session>,
            torrent: u64,
            index: u32,
            priority: u8,
        ) -> String;
        /// Relocate storage, replacing existing files.
        #[must_use]
        fn move_storage(self: Pin<&mut Session>, torrent: u64, path: &str) -> String;
        /// Per-transfer limits; negative keeps the current value.
        #[must_use]
        fn set_torrent_limits(
            self: Pin<&mut Session>,
            torrent: u64,
            download: i32,
            upload: i32,
        ) -> String;
        /// Session limits; negative keeps the current value.
        #[must_use]
        fn set_session_limits(self: Pin<&mut Session>, download: i32, upload: i32) -> String;
        /// Request a resume-data alert.
        #[must_use]
        fn save_resume_data(self: Pin<&mut Session>, torrent: u64) -> String;
        /// Request a bulk status alert.
        fn post_torrent_updates(self: Pin<&mut Session>);
        /// Wait up to `timeout_ms` for an alert.
        #[must_use]
        fn wait_for_alert(self: Pin<&mut Session>, timeout_ms: i64) -> bool;
        /// Pop and translate every pending alert.
        #[must_use]
        fn pop_events(self: Pin<&mut Session>) -> Vec<NativeEvent>;
    }
}
