use std::{sync::Arc, time::Duration};

use async_graphql::{Request, Response, Value};
use chessvars_back::{
    config::AppConfig,
    dao::game_store::memory::MemoryGameStore,
    schema::{AppSchema, build_schema},
    services::identity_service::{Caller, IdentityError, IdentityVerifier},
    state::{
        AppState, SharedState,
        game::{GameId, UserId},
    },
};
use futures::{StreamExt, future::BoxFuture};
use serde_json::Value as Json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct PlainVerifier;

impl IdentityVerifier for PlainVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<Caller, IdentityError>> {
        let caller = caller(token);
        Box::pin(async move { Ok(caller) })
    }
}

fn caller(name: &str) -> Caller {
    Caller {
        user_id: UserId::from_subject(name),
        email: Some(format!("{name}@example.com")),
    }
}

async fn setup() -> (SharedState, AppSchema) {
    let state = AppState::new(AppConfig::default(), Arc::new(PlainVerifier));
    state.install_game_store(Arc::new(MemoryGameStore::new())).await;
    let schema = build_schema(state.clone());
    (state, schema)
}

fn request(who: Option<&str>, query: &str) -> Request {
    let request = Request::new(query);
    match who {
        Some(name) => request.data(caller(name)),
        None => request,
    }
}

async fn run(schema: &AppSchema, who: Option<&str>, query: &str) -> Response {
    schema.execute(request(who, query)).await
}

fn data(response: Response) -> Json {
    assert!(response.errors.is_empty(), "unexpected errors: {:?}", response.errors);
    response.data.into_json().unwrap()
}

fn error_code(response: &Response) -> Option<Value> {
    response
        .errors
        .first()
        .and_then(|err| err.extensions.as_ref())
        .and_then(|extensions| extensions.get("code"))
        .cloned()
}

fn user_id(name: &str) -> String {
    UserId::from_subject(name).as_str().to_owned()
}

/// Creates a game as alice, joins as bob and returns (id, first mover, second mover).
async fn ready_game(schema: &AppSchema) -> (String, &'static str, &'static str) {
    let created = data(
        run(
            schema,
            Some("alice"),
            "mutation { gameCreate(type: JANGGI, limit: RAPID) { code success message game { id timeLimit type } } }",
        )
        .await,
    );
    let response = &created["gameCreate"];
    assert_eq!(response["code"], 200);
    assert_eq!(response["success"], true);
    assert_eq!(response["message"], "game was successfully created");
    assert_eq!(response["game"]["timeLimit"], 10);
    assert_eq!(response["game"]["type"], "JANGGI");
    let id = response["game"]["id"].as_str().unwrap().to_owned();

    let joined = data(
        run(
            schema,
            Some("bob"),
            &format!("mutation {{ gameJoin(id: \"{id}\") {{ message game {{ playerOne {{ id }} playerTwo {{ id }} phase }} }} }}"),
        )
        .await,
    );
    let game = &joined["gameJoin"]["game"];
    assert_eq!(joined["gameJoin"]["message"], "game successfully joined");
    assert_eq!(game["phase"], "IN_PROGRESS");

    if game["playerOne"]["id"] == user_id("alice") {
        assert_eq!(game["playerTwo"]["id"], user_id("bob"));
        (id, "alice", "bob")
    } else {
        assert_eq!(game["playerOne"]["id"], user_id("bob"));
        (id, "bob", "alice")
    }
}

async fn play(schema: &AppSchema, who: &str, id: &str, notation: &str, status: &str) -> Response {
    run(
        schema,
        Some(who),
        &format!(
            "mutation {{ gameMove(id: \"{id}\", move: \"{notation}\", status: {status}) {{ message game {{ moves {{ move ply }} winner {{ id }} draw aborted }} }} }}"
        ),
    )
    .await
}

#[tokio::test]
async fn full_match_over_graphql() {
    let (state, schema) = setup().await;
    let (id, first, second) = ready_game(&schema).await;

    let mut moves = schema.execute_stream(request(
        Some(second),
        &format!("subscription {{ onMoveNew(id: \"{id}\") {{ move ply }} }}"),
    ));
    let next_move = tokio::spawn(async move { moves.next().await });

    let second_id = UserId::from_subject(second);
    let game_id = GameId::parse(&id).unwrap();
    timeout(WAIT, async {
        while !state.moves().is_registered(&game_id, &second_id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription should register");

    let opened = data(play(&schema, first, &id, "a1a2", "IN_PROGRESS").await);
    assert_eq!(opened["gameMove"]["message"], "move was successfully added");

    let pushed = timeout(WAIT, next_move).await.unwrap().unwrap().unwrap();
    let pushed = data(pushed);
    assert_eq!(pushed["onMoveNew"]["move"], "a1a2");
    assert_eq!(pushed["onMoveNew"]["ply"], 0);

    let finished = data(play(&schema, second, &id, "a1a2", "WIN").await);
    let game = &finished["gameMove"]["game"];
    assert_eq!(game["winner"]["id"], user_id(second));
    assert_eq!(game["moves"].as_array().unwrap().len(), 2);
    assert_eq!(game["draw"], false);
    assert_eq!(game["aborted"], false);

    let ratings_query = format!(
        "{{ me: user {{ elo {{ janggi shogi }} }} other: user(id: \"{}\") {{ elo {{ janggi }} }} }}",
        user_id(second)
    );
    let ratings = timeout(WAIT, async {
        loop {
            let ratings = data(run(&schema, Some(first), &ratings_query).await);
            if ratings["other"]["elo"]["janggi"] == 1216 && ratings["me"]["elo"]["janggi"] == 1184 {
                break ratings;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ratings should settle");
    assert_eq!(ratings["me"]["elo"]["shogi"], 1200);

    let rejected = play(&schema, first, &id, "b1b2", "IN_PROGRESS").await;
    assert_eq!(error_code(&rejected), Some(Value::from("FAILED_PRECONDITION")));
}

#[tokio::test]
async fn invalid_notation_is_bad_input() {
    let (_state, schema) = setup().await;
    let (id, first, _) = ready_game(&schema).await;

    let rejected = play(&schema, first, &id, "z9z9", "IN_PROGRESS").await;
    assert_eq!(error_code(&rejected), Some(Value::from("BAD_USER_INPUT")));

    let game = data(
        run(&schema, None, &format!("{{ game(id: \"{id}\") {{ moves {{ move }} phase }} }}")).await,
    );
    assert!(game["game"]["moves"].as_array().unwrap().is_empty());
    assert_eq!(game["game"]["phase"], "IN_PROGRESS");
}

#[tokio::test]
async fn anonymous_mutations_are_unauthenticated() {
    let (_state, schema) = setup().await;

    let response = run(
        &schema,
        None,
        "mutation { gameCreate(type: SHOGI, limit: BULLET) { code } }",
    )
    .await;
    assert_eq!(error_code(&response), Some(Value::from("UNAUTHENTICATED")));

    let response = run(&schema, None, "{ user { id } }").await;
    assert_eq!(error_code(&response), Some(Value::from("UNAUTHENTICATED")));
}

#[tokio::test]
async fn unknown_game_is_not_found() {
    let (_state, schema) = setup().await;
    let missing = format!("igam{}", "a".repeat(32));

    let response = run(&schema, None, &format!("{{ game(id: \"{missing}\") {{ id }} }}")).await;
    assert_eq!(error_code(&response), Some(Value::from("NOT_FOUND")));

    let response = run(&schema, None, "{ game(id: \"nope\") { id } }").await;
    assert_eq!(error_code(&response), Some(Value::from("BAD_USER_INPUT")));
}

#[tokio::test]
async fn abort_ends_the_game() {
    let (_state, schema) = setup().await;
    let (id, first, second) = ready_game(&schema).await;

    let out_of_turn = run(
        &schema,
        Some(second),
        &format!("mutation {{ gameAbort(id: \"{id}\") {{ message }} }}"),
    )
    .await;
    assert_eq!(error_code(&out_of_turn), Some(Value::from("FAILED_PRECONDITION")));

    let aborted = data(
        run(
            &schema,
            Some(first),
            &format!("mutation {{ gameAbort(id: \"{id}\") {{ message game {{ aborted phase }} }} }}"),
        )
        .await,
    );
    assert_eq!(aborted["gameAbort"]["message"], "game aborted");
    assert_eq!(aborted["gameAbort"]["game"]["aborted"], true);
    assert_eq!(aborted["gameAbort"]["game"]["phase"], "ABORTED");
}

#[tokio::test]
async fn own_profile_is_created_on_first_lookup() {
    let (_state, schema) = setup().await;
    let profile_query = format!("{{ user(id: \"{}\") {{ exists username }} }}", user_id("alice"));

    let unseen = data(run(&schema, Some("bob"), &profile_query).await);
    assert_eq!(unseen["user"]["exists"], false);
    assert_eq!(unseen["user"]["username"], Json::Null);

    let me = data(run(&schema, Some("alice"), "{ user { id exists username } }").await);
    assert_eq!(me["user"]["id"], user_id("alice"));
    assert_eq!(me["user"]["exists"], true);
    assert_eq!(me["user"]["username"], "alice");

    let seen = data(run(&schema, Some("bob"), &profile_query).await);
    assert_eq!(seen["user"]["exists"], true);
    assert_eq!(seen["user"]["username"], "alice");
}
