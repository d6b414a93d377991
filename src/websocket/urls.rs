//! Connection URL construction.
//!
//! Matchmaker and lobby hand each player a ready-to-open WebSocket URL
//! with identity, rating, and color baked into the query string.

use url::form_urlencoded;

use crate::protocol::{GameId, PlayerColor, PlayerDescriptor};

/// Extra query parameters carried by lobby-seeded connections.
#[derive(Debug, Clone, Default)]
pub struct LobbySeedParams {
    pub is_unrated: bool,
    pub opening_name: Option<String>,
    pub opening_fen: Option<String>,
}

/// URL a player opens to join their game room.
#[must_use]
pub fn game_connection_url(
    base_url: &str,
    game_id: GameId,
    player: &PlayerDescriptor,
    color: PlayerColor,
    lobby_seed: Option<&LobbySeedParams>,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("playerId", &player.player_id)
        .append_pair("displayName", &player.display_name)
        .append_pair("rating", &player.rating.to_string())
        .append_pair("isProvisional", &player.is_provisional.to_string())
        .append_pair("color", color.as_str());

    if let Some(seed) = lobby_seed {
        query.append_pair("mode", "lobby");
        query.append_pair("isUnrated", &seed.is_unrated.to_string());
        if let Some(opening_name) = &seed.opening_name {
            query.append_pair("openingName", opening_name);
        }
        if let Some(opening_fen) = &seed.opening_fen {
            query.append_pair("openingFen", opening_fen);
        }
    }

    format!(
        "{}/game/{}/ws?{}",
        base_url.trim_end_matches('/'),
        game_id,
        query.finish()
    )
}
