mod support;

use axum::http::{
    StatusCode,
    header::{CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS},
};

use support::{MultipartForm, SMALL_GIF, TestApp, assert_redirect, body_text, location};

#[tokio::test]
async fn anonymous_authoring_requests_redirect_to_login() {
    let app = TestApp::new();
    let author = app.store.seed_user("author");
    let post = app.store.seed_post(&author, None, "Text");

    let response = app.get("/create/", None).await;
    assert_redirect(&response, "/auth/login/?next=/create/");

    let edit = format!("/posts/{}/edit/", post.id);
    let response = app.get(&edit, None).await;
    assert_redirect(&response, &format!("/auth/login/?next={edit}"));

    let comment = format!("/posts/{}/comment/", post.id);
    let response = app.post_urlencoded(&comment, None, "text=hello").await;
    assert_redirect(&response, &format!("/auth/login/?next={comment}"));
    assert!(app.store.comment_texts(post.id).is_empty());

    let response = app
        .post_multipart("/create/", None, MultipartForm::new().text("text", "sneaky"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn create_form_offers_text_area_and_group_choices() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    app.store.seed_group("Cats", "cats");
    app.store.seed_group("Dogs", "dogs");
    let cookie = app.sign_in(&user).await;

    let response = app.get("/create/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;

    assert!(html.contains("<textarea name=\"text\""));
    assert!(html.contains("<select name=\"group\""));
    assert!(html.contains(">Cats</option>"));
    assert!(html.contains(">Dogs</option>"));
    assert!(html.contains("type=\"file\" name=\"image\""));
    assert!(html.contains("enctype=\"multipart/form-data\""));
    assert!(!html.contains("Edit post"));
}

#[tokio::test]
async fn valid_create_adds_one_post_and_redirects_to_profile() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let group = app.store.seed_group("Cats", "cats");
    let cookie = app.sign_in(&user).await;
    let before = app.store.post_count();

    let form = MultipartForm::new()
        .text("text", "Brand new post")
        .text("group", &group.id.to_string())
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    let response = app.post_multipart("/create/", Some(&cookie), form).await;

    assert_redirect(&response, "/profile/author/");
    assert_eq!(app.store.post_count(), before + 1);

    let html = body_text(app.get("/profile/author/", None).await).await;
    assert!(html.contains("Brand new post"));
    assert!(html.contains("All posts in Cats"));

    let listing = body_text(app.get("/", None).await).await;
    let start = listing.find("src=\"/media/").expect("image rendered") + "src=\"".len();
    let end = start + listing[start..].find('"').expect("closing quote");
    let media = app.get(&listing[start..end], None).await;
    assert_eq!(media.status(), StatusCode::OK);
    assert_eq!(
        media.headers().get(CONTENT_TYPE).map(|value| value.as_bytes()),
        Some(&b"image/gif"[..])
    );
}

#[tokio::test]
async fn invalid_create_rerenders_the_form_without_saving() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new().text("text", "   ").text("group", "42");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("This field is required."));
    assert!(html.contains("Select a valid choice."));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn non_image_upload_is_rejected_and_not_stored() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new()
        .text("text", "With attachment")
        .file("image", "notes.txt", "text/plain", b"plain text");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Upload a valid image."));
    assert_eq!(app.store.post_count(), 0);
    assert!(!app.media.path().join("posts").exists());
}

#[tokio::test]
async fn svg_upload_is_rejected_even_with_an_image_content_type() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" onload="alert(document.cookie)"/>"#;
    let form = MultipartForm::new()
        .text("text", "Vector art")
        .file("image", "x.svg", "image/svg+xml", svg);
    let response = app.post_multipart("/create/", Some(&cookie), form).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Upload a valid image."));
    assert_eq!(app.store.post_count(), 0);
    assert!(!app.media.path().join("posts").exists());
}

#[tokio::test]
async fn html_disguised_as_a_gif_is_rejected() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new()
        .text("text", "Totally a cat")
        .file(
            "image",
            "cat.gif",
            "image/gif",
            b"<html><script>document.cookie</script></html>",
        );
    let response = app.post_multipart("/create/", Some(&cookie), form).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Upload a valid image."));
    assert_eq!(app.store.post_count(), 0);
    assert!(!app.media.path().join("posts").exists());
}

#[tokio::test]
async fn stored_image_takes_the_extension_of_its_contents() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new()
        .text("text", "Misnamed")
        .file("image", "holiday.png", "image/png", SMALL_GIF);
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_redirect(&response, "/profile/author/");

    let listing = body_text(app.get("/", None).await).await;
    let start = listing.find("src=\"/media/").expect("image rendered") + "src=\"".len();
    let end = start + listing[start..].find('"').expect("closing quote");
    let src = &listing[start..end];
    assert!(src.ends_with("-holiday.gif"), "{src}");

    let media = app.get(src, None).await;
    assert_eq!(
        media.headers().get(CONTENT_TYPE).map(|value| value.as_bytes()),
        Some(&b"image/gif"[..])
    );
    assert_eq!(
        media
            .headers()
            .get(X_CONTENT_TYPE_OPTIONS)
            .map(|value| value.as_bytes()),
        Some(&b"nosniff"[..])
    );
}

#[tokio::test]
async fn non_ascii_author_is_redirected_to_an_encoded_profile() {
    let app = TestApp::new();
    let user = app.store.seed_user("лев");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new().text("text", "Привет");
    let response = app.post_multipart("/create/", Some(&cookie), form).await;
    assert_redirect(&response, "/profile/%D0%BB%D0%B5%D0%B2/");

    let profile = app.get(location(&response), Some(&cookie)).await;
    assert_eq!(profile.status(), StatusCode::OK);
    let html = body_text(profile).await;
    assert!(html.contains("Привет"));
    assert!(html.contains("href=\"/profile/%D0%BB%D0%B5%D0%B2/\""));
}

#[tokio::test]
async fn author_edit_updates_in_place_and_redirects_to_detail() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let group = app.store.seed_group("Cats", "cats");
    let post = app.store.seed_post(&user, Some(&group), "Original text");
    let cookie = app.sign_in(&user).await;
    let edit = format!("/posts/{}/edit/", post.id);

    let html = body_text(app.get(&edit, Some(&cookie)).await).await;
    assert!(html.contains("Edit post"));
    assert!(html.contains("Original text"));
    assert!(html.contains(&format!("value=\"{}\" selected", group.id)));

    let form = MultipartForm::new().text("text", "Edited text").text("group", "");
    let response = app.post_multipart(&edit, Some(&cookie), form).await;
    assert_redirect(&response, &format!("/posts/{}/", post.id));

    let stored = app.store.post(post.id).expect("post kept");
    assert_eq!(stored.text, "Edited text");
    assert_eq!(stored.group_id, None);
    assert_eq!(stored.author_id, user.id);
    assert_eq!(stored.pub_date, post.pub_date);
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn edit_without_new_image_keeps_the_stored_one() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let form = MultipartForm::new()
        .text("text", "Illustrated")
        .file("image", "small.gif", "image/gif", SMALL_GIF);
    app.post_multipart("/create/", Some(&cookie), form).await;
    let post = app.store.post(user.id + 1).expect("created post");
    let image = post.image.clone().expect("image stored");

    let form = MultipartForm::new()
        .text("text", "Still illustrated")
        .file("image", "", "application/octet-stream", b"");
    let response = app
        .post_multipart(&format!("/posts/{}/edit/", post.id), Some(&cookie), form)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let stored = app.store.post(post.id).expect("post kept");
    assert_eq!(stored.text, "Still illustrated");
    assert_eq!(stored.image.as_deref(), Some(image.as_str()));
    assert!(app.media.path().join(&image).exists());
}

#[tokio::test]
async fn non_author_edit_redirects_to_detail_and_changes_nothing() {
    let app = TestApp::new();
    let author = app.store.seed_user("author");
    let intruder = app.store.seed_user("intruder");
    let post = app.store.seed_post(&author, None, "Untouchable");
    let cookie = app.sign_in(&intruder).await;
    let edit = format!("/posts/{}/edit/", post.id);
    let detail = format!("/posts/{}/", post.id);

    let response = app.get(&edit, Some(&cookie)).await;
    assert_redirect(&response, &detail);

    let form = MultipartForm::new().text("text", "Defaced");
    let response = app.post_multipart(&edit, Some(&cookie), form).await;
    assert_redirect(&response, &detail);

    assert_eq!(app.store.post(post.id), Some(post));
}

#[tokio::test]
async fn editing_a_missing_post_is_not_found() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let response = app.get("/posts/404/edit/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn valid_comment_is_stored_and_shown_on_detail() {
    let app = TestApp::new();
    let author = app.store.seed_user("author");
    let reader = app.store.seed_user("reader");
    let post = app.store.seed_post(&author, None, "Discuss");
    let cookie = app.sign_in(&reader).await;

    let response = app
        .post_urlencoded(
            &format!("/posts/{}/comment/", post.id),
            Some(&cookie),
            "text=Nice+post",
        )
        .await;
    assert_redirect(&response, &format!("/posts/{}/", post.id));
    assert_eq!(app.store.comment_texts(post.id), ["Nice post"]);

    let html = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(html.contains("Nice post"));
    assert!(html.contains("reader"));
}

#[tokio::test]
async fn blank_comment_is_dropped_but_still_redirects() {
    let app = TestApp::new();
    let author = app.store.seed_user("author");
    let post = app.store.seed_post(&author, None, "Discuss");
    let cookie = app.sign_in(&author).await;

    let response = app
        .post_urlencoded(
            &format!("/posts/{}/comment/", post.id),
            Some(&cookie),
            "text=+++",
        )
        .await;
    assert_redirect(&response, &format!("/posts/{}/", post.id));
    assert!(app.store.comment_texts(post.id).is_empty());
}

#[tokio::test]
async fn comment_on_missing_post_is_not_found() {
    let app = TestApp::new();
    let user = app.store.seed_user("author");
    let cookie = app.sign_in(&user).await;

    let response = app
        .post_urlencoded("/posts/77/comment/", Some(&cookie), "text=hello")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(LOCATION).is_none());
}

#[tokio::test]
async fn login_redirect_target_round_trips() {
    let app = TestApp::new();
    let response = app.get("/create/", None).await;
    let target = location(&response).to_string();

    let page = app.get(&target, None).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(body_text(page).await.contains("name=\"next\" value=\"/create/\""));
}
