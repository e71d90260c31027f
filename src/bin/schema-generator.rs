use chessvars_back::schema;

fn main() {
    println!("{}", schema::sdl());
}
