// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Recording path log messages all carry the component tag

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_recorder::mux::MuxerOptions;
use stream_recorder::{
    CompletedSegment, CompressionLevel, CompressionType, FilesystemStorage, PathFormat,
    RecordFormat, SegmentWriter, SegmentWriterSettings, StreamUnit, WriteQueue, LOG_TARGET,
};
use tempfile::TempDir;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Remembers (module, target) of every event emitted by this crate
#[derive(Clone, Default)]
struct TargetRecorder {
    events: Arc<Mutex<Vec<(String, String)>>>,
}

impl<S: Subscriber> Layer<S> for TargetRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let module = metadata.module_path().unwrap_or_default();
        if module.starts_with("stream_recorder") {
            self.events
                .lock()
                .unwrap()
                .push((module.to_string(), metadata.target().to_string()));
        }
    }
}

#[test]
fn test_recording_path_logs_with_record_target() {
    let recorder = TargetRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());

    tracing::subscriber::with_default(subscriber, || {
        let dir = TempDir::new().unwrap();
        let template = format!("{}/%path/%Y-%m-%d_%H-%M-%S-%6f", dir.path().display());
        let settings = Arc::new(SegmentWriterSettings {
            path_name: "cam1".to_string(),
            path_format: PathFormat::parse(&template).unwrap(),
            muxer: MuxerOptions {
                format: RecordFormat::Mcap,
                compression: CompressionType::None,
                compression_level: CompressionLevel::Default,
                parts: false,
                path_name: "cam1".to_string(),
            },
            segment_duration: Duration::from_secs(10),
            part_duration: None,
            storage: Arc::new(FilesystemStorage::new()),
            on_segment_create: Arc::new(|_: &Path| {}),
            on_segment_complete: Arc::new(|_: &CompletedSegment| {}),
            playlist: None,
        });

        // Storage, MCAP channel registration and segment completion
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut writer = SegmentWriter::new(settings, start);
        let unit = StreamUnit::data("telemetry", Duration::ZERO, Bytes::from_static(b"x"));
        writer.write(&unit).unwrap();
        writer.close().unwrap();

        // Queue close with items pending
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let queue = WriteQueue::new(4, Duration::from_millis(10));
            queue.push(1u32).await.unwrap();
            queue.close();
        });
    });

    let events = recorder.events.lock().unwrap().clone();
    let modules: Vec<&str> = events.iter().map(|(module, _)| module.as_str()).collect();
    for expected in [
        "stream_recorder::storage::filesystem",
        "stream_recorder::mux::mcap",
        "stream_recorder::write_queue",
    ] {
        assert!(modules.contains(&expected), "no event from {}: {:?}", expected, events);
    }

    for (module, target) in &events {
        assert_eq!(target, LOG_TARGET, "event from {} has target {}", module, target);
    }
}
