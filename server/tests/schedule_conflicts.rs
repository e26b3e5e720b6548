mod common;

use cinema_server::services::catalog::{ReconfigureSeats, UpdateSchedule};
use cinema_server::services::layout::SeatLayout;
use cinema_server::utils::AppError;

use common::{at, rows_of_eight, Fixture};

#[tokio::test]
async fn test_overlapping_showings_in_one_theater_conflict() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let (movie, theater) = (showing.movie.id, showing.theater.id);

    let err = fx.schedule(movie, theater, at(1), at(3)).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = fx.schedule(movie, theater, at(-1), at(3)).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Back-to-back showings share only the boundary instant.
    fx.schedule(movie, theater, at(2), at(4)).await.unwrap();
    fx.schedule(movie, theater, at(-2), at(0)).await.unwrap();
}

#[tokio::test]
async fn test_other_theaters_are_independent() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let (other, _) = fx.theater(1).await;

    fx.schedule(showing.movie.id, other.id, at(0), at(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_window_must_be_ordered() {
    let fx = Fixture::new();
    let showing = fx.showing().await;

    let err = fx
        .schedule(showing.movie.id, showing.theater.id, at(6), at(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = fx
        .schedule(showing.movie.id, showing.theater.id, at(6), at(6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_ignores_own_window_but_not_neighbours() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    fx.schedule(showing.movie.id, showing.theater.id, at(2), at(4))
        .await
        .unwrap();
    let catalog = &fx.state.catalog;

    let moved = catalog
        .update_schedule(
            showing.schedule.id,
            UpdateSchedule {
                start_time: Some(at(-1)),
                end_time: Some(at(1)),
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.start_time, at(-1));

    let err = catalog
        .update_schedule(
            showing.schedule.id,
            UpdateSchedule {
                start_time: None,
                end_time: Some(at(3)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_active_tickets_block_schedule_changes() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;
    let catalog = &fx.state.catalog;

    let ticket = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap()
        .ticket;

    let err = catalog
        .update_schedule(
            showing.schedule.id,
            UpdateSchedule {
                start_time: Some(at(5)),
                end_time: Some(at(7)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = catalog
        .delete_schedule(showing.schedule.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = catalog
        .delete_theater(showing.theater.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = catalog
        .reconfigure_seats(
            showing.theater.id,
            ReconfigureSeats {
                capacity: Some(16),
                layout: rows_of_eight(2),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    fx.state
        .booking
        .cancel_ticket(user.id, ticket.id)
        .await
        .unwrap();

    catalog.delete_schedule(showing.schedule.id).await.unwrap();
    assert!(matches!(
        catalog.get_schedule(showing.schedule.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reconfigure_regenerates_seats() {
    let fx = Fixture::new();
    let showing = fx.showing().await;

    let detail = fx
        .state
        .catalog
        .reconfigure_seats(
            showing.theater.id,
            ReconfigureSeats {
                capacity: None,
                layout: SeatLayout {
                    rows: 2,
                    seats_per_row: 8,
                    vip_rows: vec![2],
                    premium_rows: vec![],
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(detail.seats.len(), 16);
    assert_eq!(detail.seat_summary.regular, 8);
    assert_eq!(detail.seat_summary.vip, 8);
    assert!(detail
        .seats
        .iter()
        .all(|s| showing.seats.iter().all(|old| old.id != s.id)));
}

#[tokio::test]
async fn test_seat_listing_reflects_reservations() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;
    let seat = &showing.seats[3];
    let catalog = &fx.state.catalog;

    fx.book(user.id, showing.schedule.id, seat.id).await.unwrap();

    let listing = catalog
        .list_seats(showing.theater.id, Some(showing.schedule.id))
        .await
        .unwrap();
    assert_eq!(listing.reserved, 1);
    assert_eq!(listing.available, 15);

    let availability = catalog
        .check_seat_availability(seat.id, showing.schedule.id)
        .await
        .unwrap();
    assert!(!availability.available);

    let detail = catalog.get_schedule(showing.schedule.id).await.unwrap();
    assert_eq!(detail.total_seats, 16);
    assert_eq!(detail.available_seats.len(), 15);
    assert_eq!(detail.reserved_seats.len(), 1);
}
