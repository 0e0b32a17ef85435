use crate::Context;
use crate::load::error::{ErrorKind, Result};
use crate::load::{Contribution, LoadStats, Loaded, Loader, skip_or_fail};
use almanac_cache::get_json;
use almanac_config::GamesSource;
use almanac_model::{Game, GameLibrary, Snapshot};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

const OWNED_GAMES_URL: &str = "https://api.steampowered.com/IPlayerService/GetOwnedGames/v0001/";

#[derive(Deserialize)]
struct Envelope {
    response: OwnedGames,
}

/// A private profile answers with an empty `response`.
#[derive(Deserialize)]
struct OwnedGames {
    #[serde(default)]
    games: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawGame {
    appid: u64,
    name: String,
    #[serde(default)]
    playtime_forever: u64,
    #[serde(default)]
    rtime_last_played: i64,
}
impl RawGame {
    fn into_game(self) -> Result<Game> {
        // Zero means never played.
        let last_played = match self.rtime_last_played {
            0 => None,
            seconds => Some(
                OffsetDateTime::from_unix_timestamp(seconds)
                    .or_raise(|| ErrorKind::InvalidDate(seconds.to_string()))?,
            ),
        };
        Ok(Game {
            store_url: format!("https://store.steampowered.com/app/{}/{}", self.appid, self.name.replace(' ', "_")),
            header_image: format!("https://steamcdn-a.akamaihd.net/steam/apps/{}/header.jpg", self.appid),
            app_id: self.appid,
            name: self.name,
            playtime_minutes: self.playtime_forever,
            last_played,
        })
    }
}

/// Owned games, from the Steam Web API.
pub struct Games {
    config: GamesSource,
}
impl Games {
    pub fn new(config: GamesSource) -> Self {
        Self { config }
    }

    fn url(&self) -> Result<Url> {
        Url::parse_with_params(
            OWNED_GAMES_URL,
            [
                ("format", "json"),
                ("include_appinfo", "true"),
                ("key", self.config.api_key.as_str()),
                ("steamid", self.config.steam_id.as_str()),
            ],
        )
        .or_raise(|| ErrorKind::Fetch)
    }
}

#[async_trait]
impl Loader for Games {
    fn name(&self) -> &'static str {
        "games"
    }

    #[tracing::instrument(skip_all, fields(source = "games"))]
    async fn load(&self, ctx: &Context, _previous: &Snapshot) -> Result<Loaded> {
        let envelope: Envelope = get_json(ctx.fetcher.as_ref(), &self.url()?).await.or_raise(|| ErrorKind::Fetch)?;

        let mut stats = LoadStats::default();
        let mut games = Vec::with_capacity(envelope.response.games.len());
        for value in envelope.response.games {
            let game = serde_json::from_value::<RawGame>(value)
                .or_raise(|| ErrorKind::InvalidRecord("unrecognised game".to_string()))
                .and_then(RawGame::into_game);
            match game {
                Ok(game) => games.push(game),
                Err(err) => skip_or_fail(self.name(), self.config.policy, err, &mut stats)?,
            }
        }
        stats.recomputed = games.len();

        let library = GameLibrary::new(games);
        tracing::info!(games = library.games.len(), %stats, "Loaded source");
        Ok(Loaded {
            contribution: Contribution::Games(library),
            stats,
        })
    }
}
