use serde::Deserialize;

use super::{Provider, SocialProfile};

/// OAuth endpoints and scopes for a provider.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub authorize: &'static str,
    pub token: &'static str,
    pub profile: &'static str,
    pub scopes: &'static [&'static str],
}

const GOOGLE: Endpoints = Endpoints {
    authorize: "https://accounts.google.com/o/oauth2/v2/auth",
    token: "https://oauth2.googleapis.com/token",
    profile: "https://openidconnect.googleapis.com/v1/userinfo",
    scopes: &["openid", "email", "profile"],
};

const GITHUB: Endpoints = Endpoints {
    authorize: "https://github.com/login/oauth/authorize",
    token: "https://github.com/login/oauth/access_token",
    profile: "https://api.github.com/user",
    scopes: &["user:email"],
};

const FACEBOOK: Endpoints = Endpoints {
    authorize: "https://www.facebook.com/v18.0/dialog/oauth",
    token: "https://graph.facebook.com/v18.0/oauth/access_token",
    profile: "https://graph.facebook.com/v18.0/me?fields=id,name,email,picture.type(large)",
    scopes: &["email"],
};

pub const GITHUB_EMAILS: &str = "https://api.github.com/user/emails";

impl Provider {
    pub fn endpoints(&self) -> Endpoints {
        match self {
            Provider::Google => GOOGLE,
            Provider::Github => GITHUB,
            Provider::Facebook => FACEBOOK,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl From<GoogleUser> for SocialProfile {
    fn from(u: GoogleUser) -> Self {
        Self {
            id: u.sub,
            name: u.name,
            nickname: None,
            email: u.email,
            avatar: u.picture,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<GithubUser> for SocialProfile {
    fn from(u: GithubUser) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name,
            nickname: Some(u.login),
            email: u.email,
            avatar: u.avatar_url,
        }
    }
}

/// Entry of GitHub's `/user/emails` listing.
#[derive(Debug, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// Primary verified address, if GitHub reports one.
pub fn primary_github_email(emails: Vec<GithubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

#[derive(Debug, Deserialize)]
pub struct FacebookUser {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
pub struct FacebookPicture {
    pub data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
pub struct FacebookPictureData {
    pub url: Option<String>,
}

impl From<FacebookUser> for SocialProfile {
    fn from(u: FacebookUser) -> Self {
        Self {
            id: u.id,
            name: u.name,
            nickname: None,
            email: u.email,
            avatar: u.picture.and_then(|p| p.data.url),
        }
    }
}
