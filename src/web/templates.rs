use askama::Template;

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    /// Display name when the visitor already has a session
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "private.html")]
pub struct PrivateTemplate {
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub picture: Option<String>,
}
