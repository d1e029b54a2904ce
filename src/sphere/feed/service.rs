//! 动态流聚合
//!
//! 读取放大：每个作者一次帖子查询 + 一次资料查询，每条帖子再各查一次评论和点赞。
//! 同一层的查询并发执行。

use crate::sphere::auth::Principal;
use crate::sphere::feed::models::FeedPost;
use crate::sphere::friend::FriendDao;
use crate::sphere::post::PostDao;
use crate::sphere::user::UserDao;
use anyhow::Result;
use futures_util::future::try_join_all;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

const UNKNOWN_AUTHOR: &str = "Unknown";

pub struct FeedAggregator {
    friend_dao: FriendDao,
    post_dao: PostDao,
    user_dao: UserDao,
}

/// 按创建时间倒序排列，时间相同按帖子 id 倒序
pub fn sort_feed(posts: &mut [FeedPost]) {
    posts.sort_by(|a, b| {
        b.create_time
            .cmp(&a.create_time)
            .then_with(|| b.post_id.cmp(&a.post_id))
    });
}

impl FeedAggregator {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            friend_dao: FriendDao::new(db.clone()),
            post_dao: PostDao::new(db.clone()),
            user_dao: UserDao::new(db),
        }
    }

    /// 构建 principal 的动态流：自己 + 所有好友的帖子
    pub async fn build_feed(&self, principal: &Principal) -> Result<Vec<FeedPost>> {
        // 只有单侧记录的好友边不算好友
        let mut authors = self.friend_dao.list_mutual_friend_ids(&principal.uid).await?;
        if !authors.contains(&principal.uid) {
            authors.push(principal.uid.clone());
        }
        debug!(
            "[FeedAggregator] 用户 {} 的动态来源: {} 个作者",
            principal.uid,
            authors.len()
        );

        let per_author = try_join_all(authors.iter().map(|uid| self.author_posts(uid))).await?;
        let mut feed: Vec<FeedPost> = per_author.into_iter().flatten().collect();
        sort_feed(&mut feed);
        self.annotate(&mut feed).await?;

        info!(
            "[FeedAggregator] 📰 用户 {} 的动态流共 {} 条",
            principal.uid,
            feed.len()
        );
        Ok(feed)
    }

    /// 个人主页：单个用户的帖子（含评论和点赞）
    pub async fn user_posts(&self, uid: &str) -> Result<Vec<FeedPost>> {
        let mut posts = self.author_posts(uid).await?;
        sort_feed(&mut posts);
        self.annotate(&mut posts).await?;
        Ok(posts)
    }

    async fn author_posts(&self, uid: &str) -> Result<Vec<FeedPost>> {
        let (posts, profile) = tokio::try_join!(
            self.post_dao.list_posts_by_owner(uid),
            self.user_dao.get_user(uid)
        )?;

        let (name, avatar) = match profile {
            Some(p) => {
                let avatar = (!p.avatar.trim().is_empty()).then(|| p.avatar.clone());
                (p.display_name().to_string(), avatar)
            }
            None => (UNKNOWN_AUTHOR.to_string(), None),
        };

        Ok(posts
            .into_iter()
            .map(|post| FeedPost::from_post(post, name.clone(), avatar.clone()))
            .collect())
    }

    async fn annotate(&self, posts: &mut [FeedPost]) -> Result<()> {
        let extras = try_join_all(posts.iter().map(|p| async move {
            tokio::try_join!(
                self.post_dao.list_comments(&p.post_id),
                self.post_dao.list_likes(&p.post_id)
            )
        }))
        .await?;

        for (post, (comments, likes)) in posts.iter_mut().zip(extras) {
            post.comments = comments;
            post.likes = likes;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::db::create_memory_pool;
    use crate::sphere::friend::RelationshipService;
    use crate::sphere::post::{Comment, Post};
    use crate::sphere::user::UserService;

    fn post(id: &str, owner: &str, at: i64) -> Post {
        Post {
            post_id: id.into(),
            owner_uid: owner.into(),
            title: format!("title {}", id),
            content: "content".into(),
            photo_url: String::new(),
            likes: Vec::new(),
            create_time: at,
        }
    }

    async fn befriend(rel: &RelationshipService, a: &Principal, b: &Principal) {
        rel.send_request(a, &b.uid).await.unwrap();
        rel.accept_request(b, &a.uid).await.unwrap();
    }

    async fn setup() -> (Pool<Sqlite>, Principal, Principal, Principal) {
        let db = create_memory_pool().await.unwrap();
        let users = UserService::new(db.clone());
        let alice = Principal::new("alice", "alice@x.io", "Alice");
        let bob = Principal::new("bob", "bob@x.io", "Bob");
        let carol = Principal::new("carol", "carol@x.io", "Carol");
        for p in [&alice, &bob, &carol] {
            users.ensure_profile(p).await.unwrap();
        }
        (db, alice, bob, carol)
    }

    #[test]
    fn sort_breaks_ties_by_post_id() {
        let mut posts = vec![
            FeedPost::from_post(post("a", "u", 5), "U".into(), None),
            FeedPost::from_post(post("c", "u", 1), "U".into(), None),
            FeedPost::from_post(post("b", "u", 5), "U".into(), None),
        ];
        sort_feed(&mut posts);
        let ids: Vec<_> = posts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn feed_merges_friends_in_descending_order() {
        let (db, alice, bob, carol) = setup().await;
        let rel = RelationshipService::new(db.clone());
        befriend(&rel, &alice, &bob).await;
        befriend(&rel, &carol, &alice).await;

        let dao = PostDao::new(db.clone());
        for p in [
            post("p1", "bob", 100),
            post("p2", "carol", 300),
            post("p3", "alice", 200),
            post("p4", "bob", 400),
        ] {
            dao.insert_post(&p).await.unwrap();
        }

        let feed = FeedAggregator::new(db).build_feed(&alice).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p4", "p2", "p3", "p1"]);
        assert!(feed.windows(2).all(|w| w[0].create_time > w[1].create_time));
        assert_eq!(feed[0].author_name, "Bob");
    }

    #[tokio::test]
    async fn lone_user_gets_empty_feed() {
        let (db, alice, _bob, _carol) = setup().await;
        let feed = FeedAggregator::new(db).build_feed(&alice).await.unwrap();
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn strangers_are_excluded_and_annotations_attached() {
        let (db, alice, bob, carol) = setup().await;
        let rel = RelationshipService::new(db.clone());
        befriend(&rel, &alice, &bob).await;

        let dao = PostDao::new(db.clone());
        dao.insert_post(&post("bp", "bob", 10)).await.unwrap();
        dao.insert_post(&post("cp", "carol", 20)).await.unwrap();
        dao.toggle_like("bp", "alice", 11).await.unwrap();
        for (id, at) in [("c2", 13), ("c1", 12)] {
            dao.insert_comment(&Comment {
                comment_id: id.into(),
                post_id: "bp".into(),
                author_uid: carol.uid.clone(),
                author_name: "Carol".into(),
                text: id.into(),
                create_time: at,
            })
            .await
            .unwrap();
        }

        let feed = FeedAggregator::new(db).build_feed(&alice).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].post_id, "bp");
        assert!(feed[0].liked_by("alice"));
        let comment_ids: Vec<_> = feed[0].comments.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(comment_ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn one_sided_friend_edge_is_not_a_feed_source() {
        let (db, alice, bob, _carol) = setup().await;
        sqlx::query("INSERT INTO friends (owner_uid, friend_uid, name) VALUES (?, ?, ?)")
            .bind(&alice.uid)
            .bind(&bob.uid)
            .bind("Bob")
            .execute(&db)
            .await
            .unwrap();
        PostDao::new(db.clone())
            .insert_post(&post("bp", "bob", 10))
            .await
            .unwrap();

        let rel = RelationshipService::new(db.clone());
        assert_eq!(
            rel.relation_state(&alice, &bob.uid).await.unwrap(),
            crate::sphere::friend::RelationState::None
        );
        let feed = FeedAggregator::new(db).build_feed(&alice).await.unwrap();
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn missing_profile_shows_unknown_author() {
        let (db, alice, _bob, _carol) = setup().await;
        PostDao::new(db.clone())
            .insert_post(&post("gp", "ghost", 1))
            .await
            .unwrap();

        let agg = FeedAggregator::new(db);
        let posts = agg.user_posts("ghost").await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_name, "Unknown");
        assert_eq!(posts[0].author_avatar, None);

        assert!(agg.build_feed(&alice).await.unwrap().is_empty());
    }
}
