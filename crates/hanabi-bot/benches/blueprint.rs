use criterion::{criterion_group, criterion_main, Criterion};

use hanabi_bot::SmartBot;
use hanabi_core::bot::Bot;
use hanabi_core::config::Rules;
use hanabi_core::game::Server;

fn blueprint_game(c: &mut Criterion) {
    c.bench_function("smartbot_2p_game", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed += 1;
            let mut server = Server::new(2, Rules::default());
            server.seed(seed);
            let mut bots: Vec<Box<dyn Bot>> = vec![
                Box::new(SmartBot::new(0, 2, 5)),
                Box::new(SmartBot::new(1, 2, 5)),
            ];
            server.run_game(&mut bots, None).expect("game completes")
        })
    });
}

criterion_group!(benches, blueprint_game);
criterion_main!(benches);
