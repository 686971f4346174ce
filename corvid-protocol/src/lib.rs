/*!
The type descriptor codec of the Corvid database wire protocol.

Every query result is preceded by a type descriptor: a compact list of
frames, one per type, where composite frames reference earlier frames by
position. Both halves of the codec live here:

* [describe](describe::describe) (server side) walks a schema type and
  produces the descriptor bytes plus the content id of the root type;
  [describe_params](describe::describe_params) does the same for the query
  parameter list.
* [Typedesc](descriptors::Typedesc) (client side) parses descriptor bytes
  back into a [Descriptor](descriptors::Descriptor) tree that a driver uses
  to assemble data encoders and decoders.

Composite types are content-addressed with ids derived from their
structural components, so the same type always gets the same id, no matter
which process produced it or in which order it was encountered. The schema
introspection surface the encoder consumes is defined in [schema].
*/

pub mod common;
pub mod describe;
pub mod descriptors;
pub mod encoding;
pub mod errors;
pub mod features;
pub mod schema;
