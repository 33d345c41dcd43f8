//! Declaration of plain payload events.

/// Declares an event type carrying positional payload fields.
///
/// The generated tuple struct derives `Clone` and `Debug` and gets one
/// accessor per field, named `arg0()`, `arg1()`, and so on (up to eight
/// fields).
///
/// # Example
/// ```
/// eventcore::generic_event! {
///     /// Emitted when a download finishes.
///     pub struct DownloadFinished(String, u64);
/// }
///
/// let event = DownloadFinished("archive.tar".to_owned(), 4096);
///
/// assert_eq!(event.arg0(), "archive.tar");
/// assert_eq!(*event.arg1(), 4096);
/// ```
#[macro_export]
macro_rules! generic_event {
    (@accessors $name:ident [$($accessors:ident)*] [$($indices:tt)*]) => {};

    (@accessors $name:ident
        [$accessor:ident $($accessors:ident)*]
        [$index:tt $($indices:tt)*]
        $field:ty, $($rest:ty,)*
    ) => {
        impl $name {
            #[allow(dead_code)]
            pub fn $accessor(&self) -> &$field {
                &self.$index
            }
        }

        $crate::generic_event!(@accessors $name [$($accessors)*] [$($indices)*] $($rest,)*);
    };

    ($(#[$meta:meta])* $vis:vis struct $name:ident ( $($field:ty),* $(,)? );) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name($(pub $field),*);

        $crate::generic_event!(
            @accessors $name
            [arg0 arg1 arg2 arg3 arg4 arg5 arg6 arg7]
            [0 1 2 3 4 5 6 7]
            $($field,)*
        );
    };
}
