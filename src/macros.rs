/// Construct a [`Value`][crate::Value] from a JSON-like literal.
///
/// Maps use bare identifiers as keys, lists use square brackets, and any
/// other Rust expression is converted using [`Value::from`][crate::Value].
///
/// ```
/// let data = odfill::value! {{
///     nom: "David Bruant",
///     courses: ["Radis", "Pâtes"],
///     détails: { bio: true, n: 3 },
/// }};
/// ```
#[macro_export]
macro_rules! value {
    (None) => {
        $crate::Value::None
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::Value::List(::std::vec![ $($crate::value!($elem)),* ])
    };
    ({ $($key:ident : $val:tt),* $(,)? }) => {{
        #[allow(unused_mut)]
        let mut map = $crate::Map::new();
        $( map.insert(::std::stringify!($key).to_owned(), $crate::value!($val)); )*
        $crate::Value::Map(map)
    }};
    ($other:expr) => {
        $crate::Value::from($other)
    };
}
