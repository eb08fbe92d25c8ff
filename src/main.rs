use schemer::repl;

fn main() {
    repl::run();
}
