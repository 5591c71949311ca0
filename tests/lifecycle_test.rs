//! End-to-end tests for the event lifecycle: open/close state machine,
//! day paging, soft deletes and GPS trails, all against a real SQLite
//! file in a temp directory.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use daylog::{
    Database, EventInput, EventTracker, PredictionCache, PredictionConfig, SettingsStore,
    SyncSettings,
};
use tempfile::TempDir;

fn test_tracker() -> (EventTracker, TempDir) {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("journal.sqlite3")).unwrap();
    let predictions = PredictionCache::start(db.clone(), PredictionConfig::default());
    let tracker = EventTracker::new(db, predictions, None);
    (tracker, temp_dir)
}

/// Noon local time pins an event to a known local calendar day no matter
/// which timezone the test host runs in.
fn local_noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Local
        .with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid local time")
        .with_timezone(&Utc)
}

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[tokio::test]
async fn open_close_state_machine() {
    let (tracker, _temp) = test_tracker();

    assert!(tracker.current_event().await.unwrap().is_none());

    let opened = tracker
        .start_event(EventInput::named("lunch"))
        .await
        .unwrap();
    assert!(opened.is_open());
    assert_eq!(opened.duration(), None);
    assert!(opened.id.is_some());
    assert!(!opened.uuid.is_empty());

    let current = tracker
        .current_event()
        .await
        .unwrap()
        .expect("event is open");
    assert_eq!(current.id, opened.id);
    assert_eq!(current.name, "lunch");

    // a second open event would violate the one-open-event rule
    let refused = tracker.start_event(EventInput::named("gym")).await;
    assert!(refused.is_err());

    let closed = tracker
        .close_current(Utc::now())
        .await
        .unwrap()
        .expect("there was an open event");
    assert_eq!(closed.id, opened.id);
    assert!(!closed.is_open());
    assert!(closed.ended_at.unwrap() >= closed.started_at);

    assert!(tracker.current_event().await.unwrap().is_none());

    // closing without an open event is a quiet no-op
    assert!(tracker.close_current(Utc::now()).await.unwrap().is_none());

    // and with nothing open, starting works again
    tracker.start_event(EventInput::named("gym")).await.unwrap();
    tracker.shutdown().await;
}

#[tokio::test]
async fn close_before_start_is_rejected() {
    let (tracker, _temp) = test_tracker();

    let opened = tracker
        .start_event(EventInput::named("reading"))
        .await
        .unwrap();

    let too_early = opened.started_at - Duration::minutes(5);
    assert!(tracker.close_current(too_early).await.is_err());

    // the failed close left the event open
    let still_open = tracker.current_event().await.unwrap().expect("still open");
    assert!(still_open.is_open());
    tracker.shutdown().await;
}

#[tokio::test]
async fn save_event_upserts_and_tolerates_none() {
    let (tracker, _temp) = test_tracker();

    // nothing to save is a success, not an error
    assert!(tracker.save_event(None).await.unwrap().is_none());

    // sub-second precision has to survive the text-column round trip
    let start = local_noon(2024, 5, 6) + Duration::nanoseconds(123_456_789);
    let created = tracker
        .create_event(
            EventInput::named("errands"),
            start,
            Some(start + Duration::hours(1)),
        )
        .await
        .unwrap();
    let id = created.id.unwrap();
    assert_eq!(created.duration(), Some(Duration::hours(1)));

    let mut draft = tracker.event(id).await.unwrap().expect("event exists");
    assert_eq!(draft.started_at, created.started_at);
    assert_eq!(draft.ended_at, created.ended_at);
    draft.name = "groceries".to_string();
    draft.notes = "forgot the milk".to_string();
    draft.tag = Some("chores".to_string());

    let saved = tracker
        .save_event(Some(draft))
        .await
        .unwrap()
        .expect("saved event comes back");
    assert_eq!(saved.id, Some(id));

    let reloaded = tracker.event(id).await.unwrap().expect("event exists");
    assert_eq!(reloaded.name, "groceries");
    assert_eq!(reloaded.notes, "forgot the milk");
    assert_eq!(reloaded.tag, Some("chores".to_string()));
    assert_eq!(reloaded.started_at, created.started_at);
    assert_eq!(reloaded.ended_at, created.ended_at);
    assert!(reloaded.updated_at >= created.updated_at);
    tracker.shutdown().await;
}

#[tokio::test]
async fn reopening_an_event_is_refused_while_another_is_open() {
    let (tracker, _temp) = test_tracker();

    let start = local_noon(2024, 5, 6);
    let lunch = tracker
        .create_event(
            EventInput::named("lunch"),
            start,
            Some(start + Duration::hours(1)),
        )
        .await
        .unwrap();
    let gym = tracker.start_event(EventInput::named("gym")).await.unwrap();

    // clearing lunch's end time would leave two events in progress
    let mut draft = tracker
        .event(lunch.id.unwrap())
        .await
        .unwrap()
        .expect("lunch exists");
    draft.ended_at = None;
    assert!(tracker.save_event(Some(draft)).await.is_err());

    // the refused edit changed nothing
    let kept = tracker
        .event(lunch.id.unwrap())
        .await
        .unwrap()
        .expect("lunch exists");
    assert!(!kept.is_open());
    let open: Vec<_> = tracker
        .all_events()
        .await
        .unwrap()
        .into_iter()
        .filter(|event| event.is_open())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, gym.id);

    // once gym is closed the reopen is legal, and lunch becomes the one
    // open event again
    tracker.close_current(Utc::now()).await.unwrap();
    let mut draft = tracker
        .event(lunch.id.unwrap())
        .await
        .unwrap()
        .expect("lunch exists");
    draft.ended_at = None;
    let reopened = tracker
        .save_event(Some(draft))
        .await
        .unwrap()
        .expect("reopen comes back");
    assert!(reopened.is_open());

    let open: Vec<_> = tracker
        .all_events()
        .await
        .unwrap()
        .into_iter()
        .filter(|event| event.is_open())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, lunch.id);
    tracker.shutdown().await;
}

#[tokio::test]
async fn day_paging_walks_between_days_with_events() {
    let (tracker, _temp) = test_tracker();

    for (name, start) in [
        ("breakfast", local_noon(2024, 5, 6) - Duration::hours(4)),
        ("lunch", local_noon(2024, 5, 6)),
        ("dinner", local_noon(2024, 5, 6) + Duration::hours(7)),
        ("brunch", local_noon(2024, 5, 10)),
    ] {
        tracker
            .create_event(
                EventInput::named(name),
                start,
                Some(start + Duration::minutes(45)),
            )
            .await
            .unwrap();
    }

    // most recent first within the day
    let monday = tracker.events_for_day(day(2024, 5, 6)).await.unwrap();
    let names: Vec<&str> = monday.iter().map(|event| event.name.as_str()).collect();
    assert_eq!(names, vec!["dinner", "lunch", "breakfast"]);

    // a day without events pages to its populated neighbours
    assert!(tracker
        .events_for_day(day(2024, 5, 8))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        tracker.previous_event_day(day(2024, 5, 8)).await.unwrap(),
        Some(day(2024, 5, 6))
    );
    assert_eq!(
        tracker.next_event_day(day(2024, 5, 8)).await.unwrap(),
        Some(day(2024, 5, 10))
    );

    // history ends in both directions
    assert_eq!(tracker.previous_event_day(day(2024, 5, 6)).await.unwrap(), None);
    assert_eq!(tracker.next_event_day(day(2024, 5, 10)).await.unwrap(), None);
    tracker.shutdown().await;
}

#[tokio::test]
async fn soft_delete_hides_event_but_keeps_trail() {
    let (tracker, _temp) = test_tracker();

    let start = local_noon(2024, 5, 6);
    let event = tracker
        .create_event(
            EventInput::named("hike"),
            start,
            Some(start + Duration::hours(3)),
        )
        .await
        .unwrap();
    let id = event.id.unwrap();

    assert!(tracker
        .append_location(id, 43.6532, -79.3832, start)
        .await
        .unwrap());
    assert!(tracker
        .append_location(id, 43.6600, -79.3900, start + Duration::minutes(30))
        .await
        .unwrap());

    tracker.delete_event(id).await.unwrap();

    // gone from every listing
    assert!(tracker.events_for_day(day(2024, 5, 6)).await.unwrap().is_empty());
    assert!(tracker.all_events().await.unwrap().is_empty());
    assert_eq!(tracker.previous_event_day(day(2024, 5, 8)).await.unwrap(), None);

    // but the row and its trail are still there
    let row = tracker.event(id).await.unwrap().expect("row kept");
    assert!(row.deleted);
    let trail = tracker.track_for_event(id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail[0].recorded_at <= trail[1].recorded_at);

    // new fixes for a deleted event are dropped, not stored
    assert!(!tracker
        .append_location(id, 43.7000, -79.4000, start + Duration::hours(1))
        .await
        .unwrap());
    assert_eq!(tracker.track_for_event(id).await.unwrap().len(), 2);

    // deleting again, or deleting the unknown, changes nothing
    tracker.delete_event(id).await.unwrap();
    tracker.delete_event(9999).await.unwrap();
    tracker.shutdown().await;
}

#[tokio::test]
async fn gps_fixes_attach_to_the_open_event() {
    let (tracker, _temp) = test_tracker();

    // no open event: the fix is dropped without an error
    assert!(tracker
        .record_location(43.6532, -79.3832, Utc::now())
        .await
        .unwrap()
        .is_none());

    let opened = tracker.start_event(EventInput::named("run")).await.unwrap();
    let id = opened.id.unwrap();

    let attached = tracker
        .record_location(43.6532, -79.3832, Utc::now())
        .await
        .unwrap();
    assert_eq!(attached, Some(id));

    let trail = tracker.track_for_event(id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].event_id, id);
    assert!((trail[0].latitude - 43.6532).abs() < 1e-9);
    tracker.shutdown().await;
}

#[tokio::test]
async fn open_event_survives_a_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("journal.sqlite3");

    {
        let db = Database::new(path.clone()).unwrap();
        assert_eq!(db.path(), path.as_path());
        let predictions = PredictionCache::start(db.clone(), PredictionConfig::default());
        let tracker = EventTracker::new(db, predictions, None);

        tracker
            .start_event(EventInput::named("reading"))
            .await
            .unwrap();
        tracker.shutdown().await;
    }

    let db = Database::new(path).unwrap();
    let predictions = PredictionCache::start(db.clone(), PredictionConfig::default());
    let tracker = EventTracker::new(db, predictions, None);

    let open = tracker
        .current_event()
        .await
        .unwrap()
        .expect("open event survives restart");
    assert_eq!(open.name, "reading");
    assert!(open.is_open());
    tracker.shutdown().await;
}

#[tokio::test]
async fn engine_init_wires_everything_together() {
    let temp_dir = TempDir::new().unwrap();

    let app = daylog::init(temp_dir.path().to_path_buf()).unwrap();
    let opened = app
        .tracker
        .start_event(EventInput::named("coffee"))
        .await
        .unwrap();
    app.tracker
        .close_current(Utc::now())
        .await
        .unwrap()
        .expect("event was open");

    let listed = app.tracker.all_events().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, opened.id);
    app.tracker.shutdown().await;
}

#[tokio::test]
async fn settings_keep_device_id_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");

    let first = SettingsStore::new(path.clone()).unwrap();
    let device_id = first.device_id();
    assert!(!device_id.is_empty());

    let mut prediction = first.prediction();
    prediction.min_occurrences = 4;
    first.update_prediction(prediction).unwrap();
    first
        .update_sync(SyncSettings {
            base_url: Some("https://sync.example.com".to_string()),
        })
        .unwrap();
    drop(first);

    let second = SettingsStore::new(path).unwrap();
    assert_eq!(second.device_id(), device_id);
    assert_eq!(second.prediction().min_occurrences, 4);
    assert_eq!(
        second.sync().base_url.as_deref(),
        Some("https://sync.example.com")
    );
}
