use crate::application::auth::CurrentUser;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::domain::entities::{AuthorSummary, CommentView, GroupRecord, PostView};
use crate::domain::forms::{
    CommentForm, FieldErrors, GROUP_FIELD, IMAGE_FIELD, PostForm, TEXT_FIELD,
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use url::form_urlencoded::byte_serialize;

const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day] [month repr:long] [year]");
const HUMAN_DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[day] [month repr:long] [year], [hour]:[minute]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render the shared 404 page, recording `detail` for the response logger.
pub fn render_not_found_response(chrome: LayoutChrome, detail: impl Into<String>) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        detail,
    )
    .attach(&mut response);
    response
}

fn human_date(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATE_FORMAT).unwrap_or_default()
}

fn human_datetime(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATETIME_FORMAT).unwrap_or_default()
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

/// Profile link with the username percent-encoded as one path segment.
pub fn profile_url(username: &str) -> String {
    // form encoding writes a space as `+` and a literal `+` as `%2B`
    let segment = byte_serialize(username.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("/profile/{segment}/")
}

/// Who is looking at the page.
#[derive(Clone)]
pub struct ViewerView {
    pub name: String,
    pub profile_url: String,
}

/// Parts of the page shared by every template.
#[derive(Clone, Default)]
pub struct LayoutChrome {
    pub title: String,
    pub viewer: Option<ViewerView>,
}

impl LayoutChrome {
    pub fn new(title: impl Into<String>, viewer: Option<&CurrentUser>) -> Self {
        Self {
            title: title.into(),
            viewer: viewer.map(|user| ViewerView {
                name: user.summary().label().to_string(),
                profile_url: profile_url(&user.username),
            }),
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub viewer: Option<ViewerView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            title: chrome.title,
            viewer: chrome.viewer,
            content,
        }
    }
}

#[derive(Clone)]
pub struct AuthorView {
    pub username: String,
    pub name: String,
    pub profile_url: String,
}

impl From<&AuthorSummary> for AuthorView {
    fn from(author: &AuthorSummary) -> Self {
        Self {
            username: author.username.clone(),
            name: author.label().to_string(),
            profile_url: profile_url(&author.username),
        }
    }
}

#[derive(Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub url: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub published: String,
    pub iso_date: String,
    pub author: AuthorView,
    pub group: Option<GroupLinkView>,
    pub image_url: Option<String>,
    pub detail_url: String,
}

impl From<&PostView> for PostCard {
    fn from(post: &PostView) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            published: human_date(post.pub_date),
            iso_date: post
                .pub_date
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            author: AuthorView::from(&post.author),
            group: post.group.as_ref().map(|group| GroupLinkView {
                title: group.title.clone(),
                url: format!("/group/{}/", group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
            detail_url: format!("/posts/{}/", post.id),
        }
    }
}

pub struct PageLink {
    pub number: u32,
    pub current: bool,
}

pub struct PaginatorView {
    pub number: u32,
    pub num_pages: u32,
    pub previous: Option<u32>,
    pub next: Option<u32>,
    pub pages: Vec<PageLink>,
    pub start_index: u64,
    pub end_index: u64,
    pub total_count: u64,
}

impl PaginatorView {
    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }
}

/// A rendered page of post cards with its navigation.
pub struct ListingContext {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl From<&Page<PostView>> for ListingContext {
    fn from(page: &Page<PostView>) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from).collect(),
            paginator: PaginatorView {
                number: page.number,
                num_pages: page.num_pages,
                previous: page.previous_page_number(),
                next: page.next_page_number(),
                pages: page
                    .page_numbers()
                    .map(|number| PageLink {
                        number,
                        current: number == page.number,
                    })
                    .collect(),
                start_index: page.start_index(),
                end_index: page.end_index(),
                total_count: page.total_count,
            },
        }
    }
}

pub struct IndexContext {
    pub listing: ListingContext,
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexContext>,
}

pub struct GroupView {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<&GroupRecord> for GroupView {
    fn from(group: &GroupRecord) -> Self {
        Self {
            title: group.title.clone(),
            slug: group.slug.clone(),
            description: group.description.clone(),
        }
    }
}

pub struct GroupListContext {
    pub group: GroupView,
    pub listing: ListingContext,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListTemplate {
    pub view: LayoutContext<GroupListContext>,
}

pub struct ProfileContext {
    pub author: AuthorView,
    pub post_count: u64,
    pub listing: ListingContext,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

pub struct CommentCard {
    pub author: AuthorView,
    pub text: String,
    pub created: String,
}

impl From<&CommentView> for CommentCard {
    fn from(comment: &CommentView) -> Self {
        Self {
            author: AuthorView::from(&comment.author),
            text: comment.text.clone(),
            created: human_datetime(comment.created),
        }
    }
}

pub struct CommentFormView {
    pub action: String,
    pub text: FieldView,
}

impl CommentFormView {
    pub fn unbound(post_id: i64) -> Self {
        let form = CommentForm::default();
        Self {
            action: format!("/posts/{post_id}/comment/"),
            text: FieldView::textarea(TEXT_FIELD, "Comment", form.text, true, &FieldErrors::new()),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentCard>,
    pub can_edit: bool,
    pub edit_url: String,
    pub comment_form: CommentFormView,
    pub is_authenticated: bool,
    pub login_url: String,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

/// How a form field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Textarea,
    Select,
    File,
    Text,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub value: String,
    pub required: bool,
    pub help_text: &'static str,
    pub choices: Vec<ChoiceView>,
    pub errors: Vec<String>,
}

impl FieldView {
    fn base(
        name: &'static str,
        label: &'static str,
        kind: FieldKind,
        value: String,
        required: bool,
        errors: &FieldErrors,
    ) -> Self {
        Self {
            name,
            label,
            kind,
            value,
            required,
            help_text: "",
            choices: Vec::new(),
            errors: errors.for_field(name).to_vec(),
        }
    }

    pub fn textarea(
        name: &'static str,
        label: &'static str,
        value: String,
        required: bool,
        errors: &FieldErrors,
    ) -> Self {
        Self::base(name, label, FieldKind::Textarea, value, required, errors)
    }

    pub fn is_textarea(&self) -> bool {
        self.kind == FieldKind::Textarea
    }

    pub fn is_select(&self) -> bool {
        self.kind == FieldKind::Select
    }

    pub fn is_file(&self) -> bool {
        self.kind == FieldKind::File
    }

    pub fn input_type(&self) -> &'static str {
        match self.kind {
            FieldKind::Password => "password",
            FieldKind::File => "file",
            _ => "text",
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub action: String,
    pub fields: Vec<FieldView>,
    pub non_field_errors: Vec<String>,
    pub current_image_url: Option<String>,
}

impl PostFormContext {
    /// Build the `text` / `group` / `image` form, bound to `form` and annotated with `errors`.
    pub fn new(
        action: String,
        is_edit: bool,
        form: &PostForm,
        groups: &[GroupRecord],
        errors: &FieldErrors,
    ) -> Self {
        let mut text = FieldView::textarea(TEXT_FIELD, "Text", form.text.clone(), true, errors);
        text.help_text = "Text of the new post";

        let mut group = FieldView::base(
            GROUP_FIELD,
            "Group",
            FieldKind::Select,
            form.group.clone(),
            false,
            errors,
        );
        group.help_text = "Group the post belongs to";
        group.choices = std::iter::once(ChoiceView {
            value: String::new(),
            label: "---------".to_string(),
            selected: form.group.trim().is_empty(),
        })
        .chain(groups.iter().map(|candidate| {
            let value = candidate.id.to_string();
            ChoiceView {
                selected: value == form.group.trim(),
                value,
                label: candidate.title.clone(),
            }
        }))
        .collect();

        let mut image = FieldView::base(
            IMAGE_FIELD,
            "Image",
            FieldKind::File,
            String::new(),
            false,
            errors,
        );
        image.help_text = "Optional picture for the post";

        Self {
            is_edit,
            action,
            fields: vec![text, group, image],
            non_field_errors: errors.non_field().to_vec(),
            current_image_url: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldView> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct CreatePostTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct LoginContext {
    pub action: String,
    pub next: String,
    pub fields: Vec<FieldView>,
    pub non_field_errors: Vec<String>,
}

impl LoginContext {
    pub fn new(action: &str, next: &str, username: &str, errors: &FieldErrors) -> Self {
        let username = FieldView::base(
            "username",
            "Username",
            FieldKind::Text,
            username.to_string(),
            true,
            errors,
        );
        let password = FieldView::base(
            "password",
            "Password",
            FieldKind::Password,
            String::new(),
            true,
            errors,
        );
        Self {
            action: action.to_string(),
            next: next.to_string(),
            fields: vec![username, password],
            non_field_errors: errors.non_field().to_vec(),
        }
    }
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

pub struct ErrorPageView {
    pub code: u16,
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            code: 404,
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "core/error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
