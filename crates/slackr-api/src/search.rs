use axum::{
    Json,
    extract::{Query, State},
};

use slackr_db::views::ReactFilter;
use slackr_types::api::{MessagesResponse, SearchQuery};

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiResult;

impl AppStateInner {
    /// Messages containing `query_str` in any channel the caller belongs to,
    /// grouped by channel in creation order. An empty query matches nothing.
    pub fn search(&self, token: &str, query_str: &str) -> ApiResult<MessagesResponse> {
        let caller = self.authenticate(token)?;
        if query_str.is_empty() {
            return Ok(MessagesResponse { messages: Vec::new() });
        }

        let mut messages = Vec::new();
        for channel in self.db.channels_with_member(caller.u_id)? {
            let views = self
                .db
                .channel_message_views(caller.u_id, channel.channel_id, ReactFilter::NonEmpty)?;
            messages.extend(views.into_iter().filter(|m| m.message.contains(query_str)));
        }
        Ok(MessagesResponse { messages })
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(req): Query<SearchQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    state.search(&req.token, &req.query_str).map(Json)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{harness, register};

    #[tokio::test]
    async fn test_search_scoped_to_member_channels() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let shared = h.state.channels_create(&alice.token, "shared", true).unwrap().channel_id;
        let secret = h.state.channels_create(&alice.token, "secret", false).unwrap().channel_id;
        h.state.channel_join(&bob.token, shared).unwrap();

        let hit = h.state.message_send(&alice.token, shared, "deploy at noon").unwrap().message_id;
        h.state.message_send(&alice.token, shared, "lunch?").unwrap();
        h.state.message_send(&alice.token, secret, "deploy keys").unwrap();
        h.state.message_react(&bob.token, hit, 3).unwrap();

        let found = h.state.search(&bob.token, "deploy").unwrap().messages;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message_id, hit);
        // Only reaction types in use are listed.
        assert_eq!(found[0].reacts.len(), 1);
        assert_eq!(found[0].reacts[0].react_id, 3);
        assert!(found[0].reacts[0].is_this_user_reacted);

        assert_eq!(h.state.search(&alice.token, "deploy").unwrap().messages.len(), 2);
        assert!(h.state.search(&alice.token, "").unwrap().messages.is_empty());
    }
}
