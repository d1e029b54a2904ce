//! 用户资料模型

use serde::{Deserialize, Serialize};

/// 社交链接
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socials {
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub linkedin: String,
    #[serde(default)]
    pub github: String,
}

/// 资料页统计计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    #[serde(default)]
    pub posts: i64,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub following: i64,
    #[serde(default)]
    pub karma: i64,
    #[serde(rename = "studyGroups", default)]
    pub study_groups: i64,
}

/// 用户资料文档（users/{uid}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub title: String,
    pub bio: String,
    pub location: String,
    pub avatar: String,
    pub cover_image: String,
    pub socials: Socials,
    pub stats: ProfileStats,
    pub skills: Vec<String>,
    pub create_time: i64,
}

impl UserProfile {
    /// 首次登录时创建的默认资料
    pub fn new_default(uid: &str, email: &str, name: &str, create_time: i64) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            title: String::new(),
            bio: String::new(),
            location: String::new(),
            avatar: String::new(),
            cover_image: String::new(),
            socials: Socials::default(),
            stats: ProfileStats::default(),
            skills: Vec::new(),
            create_time,
        }
    }

    /// 资料完成度（name/title/avatar/bio/location 五项中已填写的比例，0-100）
    pub fn completion_percent(&self) -> u8 {
        let fields = [&self.name, &self.title, &self.avatar, &self.bio, &self.location];
        let filled = fields.iter().filter(|f| !f.trim().is_empty()).count();
        (filled * 100 / fields.len()) as u8
    }

    /// 展示名，缺省为 "Unknown"
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Unknown"
        } else {
            &self.name
        }
    }

    pub(crate) fn apply(&mut self, update: ProfileUpdate) {
        if let Some(v) = update.name {
            self.name = v;
        }
        if let Some(v) = update.title {
            self.title = v;
        }
        if let Some(v) = update.bio {
            self.bio = v;
        }
        if let Some(v) = update.location {
            self.location = v;
        }
        if let Some(v) = update.avatar {
            self.avatar = v;
        }
        if let Some(v) = update.cover_image {
            self.cover_image = v;
        }
        if let Some(v) = update.socials {
            self.socials = v;
        }
        if let Some(v) = update.skills {
            self.skills = v;
        }
    }
}

/// 资料合并更新：只覆盖给出的字段
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub socials: Option<Socials>,
    pub skills: Option<Vec<String>>,
}

/// 解析逗号分隔的技能文本，去掉空白项
pub fn parse_skills(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_are_split_and_trimmed() {
        assert_eq!(parse_skills("rust, go ,, sql "), vec!["rust", "go", "sql"]);
        assert!(parse_skills("  ").is_empty());
    }

    #[test]
    fn completion_counts_non_blank_fields() {
        let mut p = UserProfile::new_default("u1", "a@x.io", "", 0);
        assert_eq!(p.completion_percent(), 0);
        p.name = "Alice".into();
        p.bio = "hi".into();
        p.location = "   ".into();
        assert_eq!(p.completion_percent(), 40);
    }

    #[test]
    fn apply_only_touches_given_fields() {
        let mut p = UserProfile::new_default("u1", "a@x.io", "Alice", 0);
        p.bio = "old".into();
        p.apply(ProfileUpdate {
            location: Some("Lagos".into()),
            ..Default::default()
        });
        assert_eq!(p.bio, "old");
        assert_eq!(p.location, "Lagos");
        assert_eq!(p.name, "Alice");
    }
}
