mod common;

use bytes::Bytes;
use pfss::{
    models::{
        bucket::{AccessLevel, NewBucket, PermissionGrant},
        file::{FilePatch, UploadedBlob},
        page::Pagination,
    },
    services::error::ServiceError,
};

fn bucket(name: &str) -> NewBucket {
    NewBucket {
        name: name.into(),
        description: None,
    }
}

fn text_blob(filename: &str, body: &'static str) -> UploadedBlob {
    UploadedBlob {
        filename: filename.into(),
        content_type: Some("text/plain".into()),
        bytes: Bytes::from_static(body.as_bytes()),
    }
}

#[tokio::test]
async fn read_grant_allows_listing_but_not_editing() {
    let app = common::setup().await;
    let a = app.register("user-a").await;
    let b = app.register("user-b").await;

    let docs = app
        .state
        .buckets
        .create_bucket(bucket("pfss-docs"), a.user_id)
        .await
        .unwrap();
    let file = app
        .state
        .files
        .upload_file(&a, docs.id, text_blob("plan.txt", "q3 plan"), None)
        .await
        .unwrap();

    app.state
        .buckets
        .update_permissions(
            &a,
            docs.id,
            vec![PermissionGrant {
                user_id: b.user_id,
                access: AccessLevel::Read,
                expires_at: None,
            }],
        )
        .await
        .unwrap();

    let (files, total) = app
        .state
        .files
        .list_files(&b, docs.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(files[0].path, "/plan.txt");
    assert_eq!(
        app.state.files.get_file(&b, file.id).await.unwrap().hash,
        file.hash
    );

    let result = app
        .state
        .files
        .update_file(
            &b,
            file.id,
            FilePatch {
                path: Some("/moved.txt".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(ServiceError::Denied(_))));
}

#[tokio::test]
async fn write_grant_cannot_delete_bucket() {
    let app = common::setup().await;
    let a = app.register("user-a").await;
    let w = app.register("user-w").await;

    let docs = app
        .state
        .buckets
        .create_bucket(bucket("pfss-docs"), a.user_id)
        .await
        .unwrap();
    app.state
        .buckets
        .update_permissions(
            &a,
            docs.id,
            vec![PermissionGrant {
                user_id: w.user_id,
                access: AccessLevel::Write,
                expires_at: None,
            }],
        )
        .await
        .unwrap();

    assert!(matches!(
        app.state.buckets.delete_bucket(&w, docs.id).await,
        Err(ServiceError::Denied(_))
    ));
    app.state.buckets.get_bucket(&w, docs.id).await.unwrap();
}

#[tokio::test]
async fn account_deletion_rules() {
    let app = common::setup().await;
    let root = app.root().await;
    let a = app.register("user-a").await;
    let b = app.register("user-b").await;

    assert!(matches!(
        app.state.users.delete_user(&root, root.user_id).await,
        Err(ServiceError::Denied(_))
    ));
    assert!(matches!(
        app.state.users.delete_user(&a, b.user_id).await,
        Err(ServiceError::Denied(_))
    ));

    app.state.users.delete_user(&a, a.user_id).await.unwrap();
    assert!(matches!(
        app.state.users.resolve_actor(a.user_id).await,
        Err(ServiceError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn root_bypasses_bucket_permissions() {
    let app = common::setup().await;
    let root = app.root().await;
    let a = app.register("user-a").await;

    let private = app
        .state
        .buckets
        .create_bucket(bucket("pfss-private"), a.user_id)
        .await
        .unwrap();
    let file = app
        .state
        .files
        .upload_file(&a, private.id, text_blob("secret.txt", "s3cr3t"), None)
        .await
        .unwrap();

    let (all, _) = app
        .state
        .buckets
        .list_buckets(&root, Pagination::default())
        .await
        .unwrap();
    assert!(all.iter().any(|b| b.id == private.id));
    app.state.files.get_file(&root, file.id).await.unwrap();
    app.state.files.delete_file(&root, file.id).await.unwrap();
    app.state.buckets.delete_bucket(&root, private.id).await.unwrap();
}

#[tokio::test]
async fn bucket_lifecycle_with_files() {
    let app = common::setup().await;
    let a = app.register("user-a").await;

    let docs = app
        .state
        .buckets
        .create_bucket(bucket("pfss-docs"), a.user_id)
        .await
        .unwrap();
    let one = app
        .state
        .files
        .upload_file(&a, docs.id, text_blob("one.txt", "1"), Some("/a/one.txt".into()))
        .await
        .unwrap();
    app.state
        .files
        .upload_file(&a, docs.id, text_blob("two.txt", "22"), Some("/a/two.txt".into()))
        .await
        .unwrap();

    let stats = app.state.buckets.get_stats(&a, docs.id).await.unwrap();
    assert_eq!((stats.file_count, stats.total_size), (2, 3));

    assert!(matches!(
        app.state.buckets.delete_bucket(&a, docs.id).await,
        Err(ServiceError::Conflict(_))
    ));

    let (files, _) = app
        .state
        .files
        .list_files(&a, docs.id, Pagination::default())
        .await
        .unwrap();
    for file in files {
        app.state.files.delete_file(&a, file.id).await.unwrap();
    }
    assert!(matches!(
        app.state.files.get_file(&a, one.id).await,
        Err(ServiceError::NotFound(_))
    ));

    app.state.buckets.delete_bucket(&a, docs.id).await.unwrap();
    assert!(matches!(
        app.state.buckets.get_bucket(&a, docs.id).await,
        Err(ServiceError::NotFound(_))
    ));
    // Every blob is gone with the files.
    assert_eq!(std::fs::read_dir(app.storage.path()).unwrap().count(), 0);
}
