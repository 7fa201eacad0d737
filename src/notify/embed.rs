// src/notify/embed.rs
//! Discord message payloads for posts and alerts. Pure functions, no I/O.

use serde::Serialize;

use crate::types::{MediaKind, NormalizedPost};

pub const POST_COLOR: u32 = 0x1DA1F2;
pub const ALERT_COLOR: u32 = 0xF5A623;
pub const MAX_DESCRIPTION: usize = 4096;
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

impl MessagePayload {
    pub fn embeds(embeds: Vec<Embed>) -> Self {
        Self {
            content: None,
            embeds,
        }
    }
}

/// The primary card for a post.
pub fn post_embed(post: &NormalizedPost) -> Embed {
    let title = match (&post.reshared_by_handle, post.is_reshare, post.is_reply) {
        (Some(by), true, _) => Some(format!("Retweeted by @{by}")),
        (_, _, true) => Some("Reply".to_string()),
        _ => None,
    };

    let image = card_media_index(post)
        .and_then(|i| post.media[i].display_image())
        .map(|url| EmbedImage {
            url: url.to_string(),
        });

    let fields = post
        .quoted_post_url
        .as_ref()
        .map(|q| {
            vec![EmbedField {
                name: "Quoted Tweet".into(),
                value: q.clone(),
            }]
        })
        .unwrap_or_default();

    Embed {
        title,
        description: Some(truncate_chars(&post.text, MAX_DESCRIPTION)),
        url: Some(post.permanent_url.clone()),
        color: Some(POST_COLOR),
        timestamp: Some(post.created_at.to_rfc3339()),
        author: Some(EmbedAuthor {
            name: format!("{} (@{})", post.author_display_name, post.author_handle),
            icon_url: post.author_avatar_url.clone(),
            url: format!("https://x.com/{}", post.author_handle),
        }),
        image,
        fields,
        footer: Some(EmbedFooter {
            text: metrics_line(post),
        }),
    }
}

pub fn metrics_line(post: &NormalizedPost) -> String {
    let m = &post.metrics;
    format!(
        "Likes: {} | RTs: {} | Replies: {} | Views: {}",
        m.likes, m.reshares, m.replies, m.views
    )
}

/// Index of the media item shown on the card: the first photo, else the
/// first item with a preview image.
pub fn card_media_index(post: &NormalizedPost) -> Option<usize> {
    post.media
        .iter()
        .position(|m| m.kind == MediaKind::Photo)
        .or_else(|| post.media.iter().position(|m| m.display_image().is_some()))
}

/// Image embeds for every displayable media item except the one on the card,
/// grouped per message. Embeds share the post URL so Discord renders them as
/// one gallery.
pub fn extra_media_payloads(post: &NormalizedPost) -> Vec<MessagePayload> {
    let card = card_media_index(post);
    let embeds: Vec<Embed> = post
        .media
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != card)
        .filter_map(|(_, m)| m.display_image())
        .map(|url| Embed {
            url: Some(post.permanent_url.clone()),
            image: Some(EmbedImage {
                url: url.to_string(),
            }),
            ..Embed::default()
        })
        .collect();

    embeds
        .chunks(MAX_EMBEDS_PER_MESSAGE)
        .map(|c| MessagePayload::embeds(c.to_vec()))
        .collect()
}

pub fn alert_embed(title: &str, body: &str) -> Embed {
    Embed {
        title: Some(truncate_chars(title, 256)),
        description: Some(truncate_chars(body, MAX_DESCRIPTION)),
        color: Some(ALERT_COLOR),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
        ..Embed::default()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::post;
    use crate::types::MediaItem;

    fn photo(url: &str) -> MediaItem {
        MediaItem {
            kind: MediaKind::Photo,
            url: url.into(),
            preview_url: None,
        }
    }

    #[test]
    fn reshare_card_is_titled_and_keeps_original_author() {
        let mut p = post(10);
        p.is_reshare = true;
        p.reshared_by_handle = Some("tracked".into());
        p.author_handle = "origin".into();
        p.author_display_name = "Origin".into();

        let e = post_embed(&p);
        assert_eq!(e.title.as_deref(), Some("Retweeted by @tracked"));
        let author = e.author.unwrap();
        assert_eq!(author.name, "Origin (@origin)");
        assert_eq!(author.url, "https://x.com/origin");
        assert_eq!(e.url.as_deref(), Some(p.permanent_url.as_str()));
    }

    #[test]
    fn reply_title_and_quote_field() {
        let mut p = post(11);
        p.is_reply = true;
        p.quoted_post_url = Some("https://x.com/i/status/5".into());
        let e = post_embed(&p);
        assert_eq!(e.title.as_deref(), Some("Reply"));
        assert_eq!(e.fields[0].name, "Quoted Tweet");
        assert_eq!(e.fields[0].value, "https://x.com/i/status/5");
    }

    #[test]
    fn image_prefers_photo_then_video_preview() {
        let mut p = post(12);
        p.media = vec![
            MediaItem {
                kind: MediaKind::Video,
                url: "https://video/1.mp4".into(),
                preview_url: Some("https://video/1.jpg".into()),
            },
            photo("https://img/2.jpg"),
        ];
        assert_eq!(post_embed(&p).image.unwrap().url, "https://img/2.jpg");

        p.media.truncate(1);
        assert_eq!(post_embed(&p).image.unwrap().url, "https://video/1.jpg");
    }

    #[test]
    fn footer_and_truncation() {
        let mut p = post(13);
        p.text = "é".repeat(5000);
        p.metrics.likes = 3;
        p.metrics.views = 1200;
        let e = post_embed(&p);
        assert_eq!(e.description.unwrap().chars().count(), MAX_DESCRIPTION);
        assert_eq!(
            e.footer.unwrap().text,
            "Likes: 3 | RTs: 0 | Replies: 0 | Views: 1200"
        );
    }

    #[test]
    fn extra_media_skips_first_and_chunks() {
        let mut p = post(14);
        p.media = (0..12).map(|i| photo(&format!("https://img/{i}.jpg"))).collect();
        let payloads = extra_media_payloads(&p);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].embeds.len(), 10);
        assert_eq!(payloads[1].embeds.len(), 1);
        assert_eq!(
            payloads[0].embeds[0].image.as_ref().unwrap().url,
            "https://img/1.jpg"
        );
    }

    #[test]
    fn mixed_media_never_repeats_the_card_image() {
        let mut p = post(15);
        p.media = vec![
            MediaItem {
                kind: MediaKind::Video,
                url: "https://video/1.mp4".into(),
                preview_url: Some("https://img/1.jpg".into()),
            },
            photo("https://img/2.jpg"),
            photo("https://img/3.jpg"),
        ];

        let card = post_embed(&p).image.unwrap().url;
        assert_eq!(card, "https://img/2.jpg");

        let extras: Vec<String> = extra_media_payloads(&p)
            .into_iter()
            .flat_map(|m| m.embeds)
            .filter_map(|e| e.image.map(|i| i.url))
            .collect();
        assert_eq!(extras, vec!["https://img/1.jpg", "https://img/3.jpg"]);
        assert!(!extras.contains(&card));
    }

    #[test]
    fn video_only_card_has_no_extras() {
        let mut p = post(16);
        p.media = vec![MediaItem {
            kind: MediaKind::Video,
            url: "https://video/1.mp4".into(),
            preview_url: Some("https://img/1.jpg".into()),
        }];
        assert_eq!(card_media_index(&p), Some(0));
        assert!(extra_media_payloads(&p).is_empty());
    }

    #[test]
    fn payload_omits_empty_fields() {
        let v = serde_json::to_value(MessagePayload::embeds(vec![alert_embed("t", "b")])).unwrap();
        let embed = &v["embeds"][0];
        assert!(embed.get("fields").is_none());
        assert!(embed.get("author").is_none());
        assert_eq!(embed["color"], ALERT_COLOR);
        assert!(v.get("content").is_none());
    }
}
