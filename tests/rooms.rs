//! End-to-end room flows through sessions, the registry and room tasks.
//! Time is paused so spawn, shrink and duel windows advance deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use uuid::Uuid;

use hexaquiz_server::config::GameConfig;
use hexaquiz_server::game::{Hex, RoomRegistry};
use hexaquiz_server::questions::{Question, QuestionError, QuestionRequest, QuestionSource};
use hexaquiz_server::ws::protocol::{ClientMsg, GameMode, ServerMsg};
use hexaquiz_server::ws::session::Session;

/// Every question is answered by option 0. Can be told to fail once.
#[derive(Default)]
struct FixedQuestions {
    fail_next: AtomicBool,
}

impl QuestionSource for FixedQuestions {
    fn fetch(&self, request: QuestionRequest) -> BoxFuture<'_, Result<Vec<Question>, QuestionError>> {
        let result = if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(QuestionError::Empty)
        } else {
            Ok((0..request.count)
                .map(|i| Question {
                    category: "science".to_string(),
                    prompt: format!("q{i}"),
                    options: ["a", "b", "c", "d"].map(String::from),
                    answer: 0,
                })
                .collect())
        };
        async move { result }.boxed()
    }
}

fn game_config() -> GameConfig {
    GameConfig {
        grid_radius: 2,
        loot_density: 0.0,
        ..GameConfig::default()
    }
}

fn registry_with(config: GameConfig, questions: Arc<FixedQuestions>) -> Arc<RoomRegistry> {
    Arc::new(RoomRegistry::new(Arc::new(config), questions))
}

struct Client {
    session: Session,
    rx: mpsc::UnboundedReceiver<ServerMsg>,
}

impl Client {
    fn new(registry: &Arc<RoomRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(Uuid::new_v4(), Arc::clone(registry), tx),
            rx,
        }
    }

    async fn send(&mut self, msg: ClientMsg) {
        self.session.handle(msg).await;
        settle().await;
    }

    fn drain(&mut self) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Let every room task run until idle
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn open_room(registry: &Arc<RoomRegistry>, mode: GameMode, players: usize) -> (String, Vec<Client>) {
    let mut host = Client::new(registry);
    host.send(ClientMsg::CreateRoom {
        name: Some("Host".to_string()),
        mode,
    })
    .await;
    let code = host
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMsg::RoomCreated { code, .. } => Some(code),
            _ => None,
        })
        .expect("room_created");

    let mut clients = vec![host];
    for i in 1..players {
        let mut guest = Client::new(registry);
        guest
            .send(ClientMsg::JoinRoom {
                name: Some(format!("Guest{i}")),
                code: code.to_lowercase(),
            })
            .await;
        assert!(guest
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMsg::RoomJoined { .. })));
        clients.push(guest);
    }
    for c in &mut clients {
        c.drain();
    }
    (code, clients)
}

fn has(msgs: &[ServerMsg], pred: impl Fn(&ServerMsg) -> bool) -> bool {
    msgs.iter().any(pred)
}

#[tokio::test(start_paused = true)]
async fn royale_shrink_wipes_out_edge_campers() {
    let registry = registry_with(game_config(), Arc::default());
    let (_, mut clients) = open_room(&registry, GameMode::Royale, 2).await;

    clients[0].send(ClientMsg::StartGame).await;
    for c in &mut clients {
        assert!(has(&c.drain(), |m| matches!(m, ServerMsg::SpawnPhase { spawn_time: 10, .. })));
    }

    tokio::time::sleep(Duration::from_secs(11)).await;
    for c in &mut clients {
        let msgs = c.drain();
        let you = msgs.iter().find_map(|m| match m {
            ServerMsg::GameStart { you, .. } => *you,
            _ => None,
        });
        assert_eq!(you.map(Hex::dist), Some(2), "spawns sit on the edge");
    }

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(has(&clients[1].drain(), |m| matches!(
        m,
        ServerMsg::ShrinkWarning { new_radius: 1, seconds: 5 }
    )));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let msgs = clients[0].drain();
    assert!(has(&msgs, |m| matches!(m, ServerMsg::Shrink { new_radius: 1, .. })));
    assert!(has(&msgs, |m| matches!(m, ServerMsg::GameOver { winner_idx: -1, .. })));
}

#[tokio::test(start_paused = true)]
async fn classic_center_arrival_wins_and_empty_room_is_removed() {
    let registry = registry_with(game_config(), Arc::default());
    let (code, mut clients) = open_room(&registry, GameMode::Classic, 4).await;
    assert_eq!(registry.total_players(), 4);

    for c in &mut clients {
        c.send(ClientMsg::ToggleReady).await;
    }
    tokio::time::sleep(Duration::from_secs(11)).await;
    for c in &mut clients {
        assert!(has(&c.drain(), |m| matches!(m, ServerMsg::GameStart { .. })));
    }

    clients[2].send(ClientMsg::Move { q: 0, r: 0 }).await;
    let victories = clients
        .iter_mut()
        .map(|c| c.drain())
        .filter(|msgs| has(msgs, |m| matches!(m, ServerMsg::Victory { .. })))
        .count();
    assert_eq!(victories, 1);

    assert_ok!(registry.get(&code));
    for c in &mut clients {
        c.session.leave().await;
    }
    settle().await;
    assert!(registry.get(&code).is_err());
    assert_eq!(registry.active_rooms(), 0);
}

#[tokio::test(start_paused = true)]
async fn duel_timeout_decides_for_the_answering_player() {
    let registry = registry_with(game_config(), Arc::default());
    let (_, mut clients) = open_room(&registry, GameMode::Classic, 2).await;
    clients[0].send(ClientMsg::StartGame).await;
    tokio::time::sleep(Duration::from_secs(11)).await;

    let start = clients[1]
        .drain()
        .into_iter()
        .find_map(|m| match m {
            ServerMsg::GameStart { you, .. } => you,
            _ => None,
        })
        .expect("game_start");

    clients[0].send(ClientMsg::Move { q: start.q, r: start.r }).await;
    assert!(has(&clients[1].drain(), |m| matches!(m, ServerMsg::DuelStart { .. })));

    clients[1].send(ClientMsg::DuelAnswer { answer: 0 }).await;
    tokio::time::sleep(Duration::from_secs(7)).await;

    let msgs = clients[1].drain();
    assert!(has(&msgs, |m| matches!(m, ServerMsg::DuelResult { won: true, .. })));
    assert!(has(&msgs, |m| matches!(m, ServerMsg::Victory { .. })));
    assert!(has(&clients[0].drain(), |m| matches!(
        m,
        ServerMsg::Eliminated { reason, placement: 2, .. } if reason == "Lost duel to Guest1"
    )));
}

#[tokio::test(start_paused = true)]
async fn failed_question_fetch_returns_to_lobby() {
    let questions = Arc::new(FixedQuestions::default());
    questions.fail_next.store(true, Ordering::SeqCst);
    let registry = registry_with(game_config(), questions);
    let (_, mut clients) = open_room(&registry, GameMode::Race, 2).await;

    clients[0].send(ClientMsg::StartGame).await;
    let msgs = clients[1].drain();
    assert!(has(&msgs, |m| matches!(
        m,
        ServerMsg::RoomError { msg } if msg.starts_with("Could not load questions")
    )));
    assert!(has(&msgs, |m| matches!(m, ServerMsg::RoomUpdate { .. })));
    assert!(!has(&msgs, |m| matches!(m, ServerMsg::SpawnPhase { .. })));

    clients[0].send(ClientMsg::StartGame).await;
    assert!(has(&clients[1].drain(), |m| matches!(m, ServerMsg::SpawnPhase { .. })));
}

#[tokio::test(start_paused = true)]
async fn join_refusals_are_reported() {
    let registry = registry_with(
        GameConfig {
            max_players: 2,
            ..game_config()
        },
        Arc::default(),
    );
    let (code, mut clients) = open_room(&registry, GameMode::Royale, 2).await;

    let mut late = Client::new(&registry);
    late.send(ClientMsg::JoinRoom {
        name: None,
        code: code.clone(),
    })
    .await;
    assert_eq!(late.drain(), vec![ServerMsg::RoomError { msg: "Room is full!".to_string() }]);

    late.send(ClientMsg::JoinRoom {
        name: None,
        code: "ZZZZ".to_string(),
    })
    .await;
    assert_eq!(late.drain(), vec![ServerMsg::RoomError { msg: "Room not found!".to_string() }]);

    clients[0].send(ClientMsg::StartGame).await;
    clients[1].session.leave().await;
    settle().await;
    late.send(ClientMsg::JoinRoom { name: None, code }).await;
    assert_eq!(
        late.drain(),
        vec![ServerMsg::RoomError { msg: "Game already started!".to_string() }]
    );
}

#[tokio::test(start_paused = true)]
async fn departure_mid_game_eliminates_the_leaver() {
    let registry = registry_with(game_config(), Arc::default());
    let (_, mut clients) = open_room(&registry, GameMode::Royale, 3).await;
    clients[0].send(ClientMsg::StartGame).await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    for c in &mut clients {
        c.drain();
    }

    clients[2].session.leave().await;
    settle().await;

    let msgs = clients[0].drain();
    assert!(has(&msgs, |m| matches!(m, ServerMsg::OppLeft { idx: 2, .. })));
    assert!(has(&msgs, |m| matches!(
        m,
        ServerMsg::PlayerEliminated { idx: 2, alive_count: 2, placement: 3, reason } if reason == "Left the game"
    )));
    assert_eq!(registry.total_players(), 2);
}
