//! Domain rules of the comment, favorite and follow services

mod common;

use collection_cache::ParentKey;
use interaction_service::domain::models::{Comment, Favorite, Follow};
use interaction_service::services::comments::MAX_COMMENT_CHARS;
use interaction_service::services::{CommentService, FavoriteService, FollowService};
use interaction_service::ServiceError;

use common::Harness;

fn triple(counter: &str, entity_id: i64, delta: i64) -> (String, i64, i64) {
    (counter.to_string(), entity_id, delta)
}

#[tokio::test]
async fn test_comment_text_is_validated() {
    let h = Harness::<Comment>::new("comment");
    let service = CommentService::new(h.repo.clone());

    let err = service.create_comment(1, 2, "   ").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let too_long = "x".repeat(MAX_COMMENT_CHARS + 1);
    let err = service.create_comment(1, 2, &too_long).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let err = service.create_comment(0, 2, "hi").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let max = "字".repeat(MAX_COMMENT_CHARS);
    assert!(service.create_comment(1, 2, &max).await.is_ok());

    h.settle().await;
    assert_eq!(h.publisher.events().len(), 1);
}

#[tokio::test]
async fn test_comment_listing_is_newest_first() {
    let h = Harness::<Comment>::new("comment");
    let service = CommentService::new(h.repo.clone());

    for text in ["first", "second", "third"] {
        service.create_comment(42, 1, text).await.unwrap();
    }

    let listed = service.list_comments(42).await.unwrap();
    let texts: Vec<&str> = listed.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, vec!["third", "second", "first"]);

    // Same order once served from the cache
    h.settle().await;
    let cached = service.list_comments(42).await.unwrap();
    assert_eq!(cached, listed);
}

#[tokio::test]
async fn test_only_author_deletes_comment() {
    let h = Harness::<Comment>::new("comment");
    let service = CommentService::new(h.repo.clone());
    let comment = service.create_comment(42, 7, "mine").await.unwrap();

    let err = service.delete_comment(42, comment.id, 8).await.unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let err = service.delete_comment(42, 999, 7).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let deleted = service.delete_comment(42, comment.id, 7).await.unwrap();
    assert_eq!(deleted.id, comment.id);

    h.settle().await;
    assert_eq!(
        h.publisher.triples(),
        vec![
            triple("video_comment_count", 42, -1),
            triple("video_comment_count", 42, 1),
        ]
    );
}

#[tokio::test]
async fn test_favorite_emits_three_deltas() {
    let h = Harness::<Favorite>::new("favorite");
    let service = FavoriteService::new(h.repo.clone());

    assert!(service.favorite_action(10, 500, 77, 1).await.unwrap());
    h.settle().await;

    assert_eq!(
        h.publisher.triples(),
        vec![
            triple("user_favorite_count", 10, 1),
            triple("user_total_favorited", 77, 1),
            triple("video_favorite_count", 500, 1),
        ]
    );

    // Unfavorite takes the author from the stored edge
    assert!(service.favorite_action(10, 500, 0, 2).await.unwrap());
    h.settle().await;

    let deltas: i64 = h.publisher.events().iter().map(|e| e.delta).sum();
    assert_eq!(h.publisher.events().len(), 6);
    assert_eq!(deltas, 0);
    assert!(h
        .publisher
        .triples()
        .contains(&triple("user_total_favorited", 77, -1)));
}

#[tokio::test]
async fn test_repeated_favorite_actions_are_no_ops() {
    let h = Harness::<Favorite>::new("favorite");
    let service = FavoriteService::new(h.repo.clone());

    assert!(service.favorite_action(10, 500, 77, 1).await.unwrap());
    assert!(!service.favorite_action(10, 500, 77, 1).await.unwrap());
    assert!(service.favorite_action(10, 500, 77, 2).await.unwrap());
    assert!(!service.favorite_action(10, 500, 77, 2).await.unwrap());

    h.settle().await;
    assert_eq!(h.publisher.events().len(), 6);
}

#[tokio::test]
async fn test_unknown_action_type_is_rejected() {
    let h = Harness::<Favorite>::new("favorite");
    let service = FavoriteService::new(h.repo.clone());

    let err = service.favorite_action(10, 500, 77, 3).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert_eq!(h.store.list_calls(), 0);
}

#[tokio::test]
async fn test_favorites_listing_and_batch_check() {
    let h = Harness::<Favorite>::new("favorite");
    let service = FavoriteService::new(h.repo.clone());

    for video in [500, 501] {
        service.favorite_action(10, video, 77, 1).await.unwrap();
    }

    let listed: Vec<i64> = service
        .list_favorites(10)
        .await
        .unwrap()
        .iter()
        .map(|f| f.video_id)
        .collect();
    assert_eq!(listed, vec![501, 500]);

    h.settle().await;
    assert!(h.cache.has_sentinel(ParentKey(10)));
    assert_eq!(
        service.is_favorited(10, &[500, 502, 501]).await.unwrap(),
        vec![true, false, true]
    );
}

#[tokio::test]
async fn test_self_follow_is_rejected() {
    let h = Harness::<Follow>::new("follow");
    let service = FollowService::new(h.repo.clone());

    let err = service.follow_action(5, 5, 1).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
    assert!(h.store.children_of(ParentKey(5)).is_empty());
}

#[tokio::test]
async fn test_follow_round_trip_deltas_cancel_out() {
    let h = Harness::<Follow>::new("follow");
    let service = FollowService::new(h.repo.clone());

    assert!(service.follow_action(1, 2, 1).await.unwrap());
    assert_eq!(service.is_following(1, &[2, 3]).await.unwrap(), vec![true, false]);
    assert!(service.follow_action(1, 2, 2).await.unwrap());
    h.settle().await;

    assert_eq!(
        h.publisher.triples(),
        vec![
            triple("user_follow_count", 1, -1),
            triple("user_follow_count", 1, 1),
            triple("user_follower_count", 2, -1),
            triple("user_follower_count", 2, 1),
        ]
    );
    assert!(service.list_following(1).await.unwrap().is_empty());
}
