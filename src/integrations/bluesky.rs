//! Bluesky（AT Protocol）客户端
//!
//! 登录（createSession）、拉取通知、按 URI 取帖子图片、回复帖子。
//! 通知文本中被截断显示的链接会按 link facet 还原为完整 URI，保证 `job run <url>` 拿到真实地址。

use std::sync::OnceLock;

use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::command::{ImageRef, Mention, PostRef, PostType};
use crate::core::BotError;

const LINK_FEATURE: &str = "app.bsky.richtext.facet#link";
const IMAGES_EMBED: &str = "app.bsky.embed.images";
const RECORD_EMBED: &str = "app.bsky.embed.record";
const RECORD_WITH_MEDIA_EMBED: &str = "app.bsky.embed.recordWithMedia";
const CDN_BASE: &str = "https://cdn.bsky.app/img/feed_fullsize/plain";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

#[derive(Debug, Deserialize)]
struct NotificationResponse {
    #[serde(default)]
    notifications: Vec<Notification>,
}

/// listNotifications 中的一条
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub reason: String,
    #[serde(default)]
    pub record: Record,
    #[serde(default)]
    pub indexed_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub facets: Vec<Facet>,
    pub reply: Option<ReplyRef>,
    pub embed: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(rename = "$type")]
    pub type_: String,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct PostView {
    embed: Option<serde_json::Value>,
}

pub struct BlueskyClient {
    client: Client,
    api_base: String,
    identifier: String,
    password: String,
    session: RwLock<Option<Session>>,
}

impl BlueskyClient {
    pub fn new(api_base: &str, identifier: &str, password: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            identifier: identifier.to_string(),
            password: password.to_string(),
            session: RwLock::new(None),
        }
    }

    pub fn handle(&self) -> &str {
        &self.identifier
    }

    /// 创建会话（也用于 token 过期后重新登录）
    pub async fn login(&self) -> Result<Session, BotError> {
        let url = format!("{}/com.atproto.server.createSession", self.api_base);
        let body = serde_json::json!({
            "identifier": self.identifier,
            "password": self.password,
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            let status = resp.status();
            return Err(BotError::Auth(format!(
                "failed to authenticate {}, status code: {}",
                self.identifier, status
            )));
        }
        let session: Session = resp.json().await?;
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn session(&self) -> Result<Session, BotError> {
        if let Some(s) = self.session.read().await.as_ref() {
            return Ok(s.clone());
        }
        self.login().await
    }

    /// 拉取通知并还原 link facet
    pub async fn list_notifications(&self) -> Result<Vec<Notification>, BotError> {
        let session = self.session().await?;
        let url = format!("{}/app.bsky.notification.listNotifications", self.api_base);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&session.access_jwt)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(BotError::from_response(resp).await);
        }
        let body: NotificationResponse = resp.json().await?;
        Ok(body
            .notifications
            .into_iter()
            .map(|mut n| {
                n.record.text = expand_link_facets(&n.record.text, &n.record.facets);
                n
            })
            .collect())
    }

    /// 取某个帖子携带的图片（父帖 / 引用帖取图用）
    pub async fn get_post_images(&self, uri: &str) -> Result<Vec<ImageRef>, BotError> {
        let session = self.session().await?;
        let url = format!("{}/app.bsky.feed.getPosts", self.api_base);
        let resp = self
            .client
            .get(&url)
            .query(&[("uris", uri)])
            .bearer_auth(&session.access_jwt)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(BotError::from_response(resp).await);
        }
        let body: PostsResponse = resp.json().await?;
        Ok(body
            .posts
            .into_iter()
            .next()
            .and_then(|p| p.embed)
            .map(|embed| images_from_view(&embed))
            .unwrap_or_default())
    }

    /// 回复 mention，返回新帖子的 URI
    pub async fn reply(&self, mention: &Mention, text: &str) -> Result<String, BotError> {
        let session = self.session().await?;
        let url = format!("{}/com.atproto.repo.createRecord", self.api_base);

        let parent = serde_json::json!({ "uri": mention.id, "cid": mention.cid });
        let root = mention
            .root
            .as_ref()
            .map(|r| serde_json::json!({ "uri": r.uri, "cid": r.cid }))
            .unwrap_or_else(|| parent.clone());

        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": chrono::Utc::now().to_rfc3339(),
            "reply": { "root": root, "parent": parent },
        });
        let facets = link_facets(text);
        if !facets.is_empty() {
            record["facets"] = serde_json::Value::Array(facets);
        }

        let payload = serde_json::json!({
            "collection": "app.bsky.feed.post",
            "repo": session.did,
            "record": record,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&session.access_jwt)
            .json(&payload)
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(BotError::from_response(resp).await);
        }
        let body: serde_json::Value = resp.json().await?;
        body["uri"]
            .as_str()
            .map(str::to_string)
            .ok_or(BotError::MissingField("uri"))
    }
}

/// 把 facet 覆盖的字节区间替换为完整链接；从后往前替换，前面的偏移不受影响
pub fn expand_link_facets(text: &str, facets: &[Facet]) -> String {
    let mut links: Vec<(usize, usize, &str)> = facets
        .iter()
        .flat_map(|f| {
            f.features
                .iter()
                .filter(|feat| feat.type_ == LINK_FEATURE)
                .filter_map(move |feat| {
                    feat.uri
                        .as_deref()
                        .map(|uri| (f.index.byte_start, f.index.byte_end, uri))
                })
        })
        .collect();
    links.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = text.to_string();
    for (start, end, uri) in links {
        if start <= end
            && end <= out.len()
            && out.is_char_boundary(start)
            && out.is_char_boundary(end)
        {
            out.replace_range(start..end, uri);
        } else {
            tracing::warn!("Skipping link facet with invalid range {}..{}", start, end);
        }
    }
    out
}

static URL_RE: OnceLock<Regex> = OnceLock::new();

/// 为回复中的 URL 生成 link facet，使链接可点击
fn link_facets(text: &str) -> Vec<serde_json::Value> {
    let re = URL_RE.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("valid url regex"));
    re.find_iter(text)
        .map(|m| {
            serde_json::json!({
                "index": { "byteStart": m.start(), "byteEnd": m.end() },
                "features": [{ "$type": LINK_FEATURE, "uri": m.as_str() }],
            })
        })
        .collect()
}

/// 通知 → Mention
pub fn to_mention(n: &Notification) -> Mention {
    let embed = n.record.embed.as_ref();
    let quoted_uri = embed.and_then(quoted_uri_from_record);
    let post_type = if n.reason == "quote" || quoted_uri.is_some() {
        PostType::Quote
    } else if n.reason == "reply" || n.record.reply.is_some() {
        PostType::Reply
    } else {
        PostType::Standalone
    };

    Mention {
        id: n.uri.clone(),
        cid: n.cid.clone(),
        author_handle: n.author.handle.clone(),
        author_did: n.author.did.clone(),
        text: n.record.text.clone(),
        post_type,
        created_at: chrono::DateTime::parse_from_rfc3339(&n.record.created_at)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc)),
        images: embed
            .map(|e| images_from_record(e, &n.author.did))
            .unwrap_or_default(),
        parent_uri: n.record.reply.as_ref().map(|r| r.parent.uri.clone()),
        root: n.record.reply.as_ref().map(|r| PostRef {
            uri: r.root.uri.clone(),
            cid: r.root.cid.clone(),
        }),
        quoted_uri,
    }
}

fn embed_type(v: &serde_json::Value) -> &str {
    v["$type"].as_str().unwrap_or_default()
}

/// 帖子记录里的图片只有 blob cid，需拼出 CDN 地址
fn images_from_record(embed: &serde_json::Value, did: &str) -> Vec<ImageRef> {
    let images = match embed_type(embed) {
        IMAGES_EMBED => &embed["images"],
        RECORD_WITH_MEDIA_EMBED => &embed["media"]["images"],
        _ => return Vec::new(),
    };
    images
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|img| {
                    let cid = img["image"]["ref"]["$link"].as_str()?;
                    Some(ImageRef {
                        url: format!("{CDN_BASE}/{did}/{cid}@jpeg"),
                        alt: img["alt"].as_str().filter(|a| !a.is_empty()).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// getPosts 返回的 view 里直接带 fullsize 地址
fn images_from_view(embed: &serde_json::Value) -> Vec<ImageRef> {
    let t = embed_type(embed);
    let images = if t.starts_with(IMAGES_EMBED) {
        &embed["images"]
    } else if t.starts_with(RECORD_WITH_MEDIA_EMBED) {
        &embed["media"]["images"]
    } else {
        return Vec::new();
    };
    images
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|img| {
                    Some(ImageRef {
                        url: img["fullsize"].as_str()?.to_string(),
                        alt: img["alt"].as_str().filter(|a| !a.is_empty()).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn quoted_uri_from_record(embed: &serde_json::Value) -> Option<String> {
    let uri = match embed_type(embed) {
        RECORD_EMBED => embed["record"]["uri"].as_str(),
        RECORD_WITH_MEDIA_EMBED => embed["record"]["record"]["uri"].as_str(),
        _ => None,
    };
    uri.map(str::to_string)
}
